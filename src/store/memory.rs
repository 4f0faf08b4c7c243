use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::model::election::{Candidate, CandidateCore, Election, ElectionCore};
use crate::model::id::Id;
use crate::model::identity::{ExternalId, Identity, NewIdentity, PasswordCredential};
use crate::model::vote::{NewVote, Vote};
use crate::wallet::WalletAddress;

use super::{InsertError, Store, StoreError, UniqueIndex, UniquenessReport};

/// An in-memory [`Store`] enforcing the same unique indexes a production
/// deployment declares. Backs the test suite and small demos; everything
/// is lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Tables>,
}

#[derive(Debug, Default)]
struct Tables {
    next_id: u64,
    credentials: HashMap<Id, CredentialRow>,
    identities: HashMap<Id, Identity>,
    elections: HashMap<Id, Election>,
    candidates: HashMap<Id, Candidate>,
    votes: HashMap<Id, Vote>,
}

#[derive(Debug)]
struct CredentialRow {
    email: String,
    #[allow(dead_code)] // Read back by the embedder's sign-in path, not by this crate.
    credential: PasswordCredential,
}

impl Tables {
    fn next_id(&mut self) -> Id {
        self.next_id += 1;
        Id::from(self.next_id)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.inner.lock().expect("store mutex poisoned")
    }

    /// Number of stored credentials. Exposed so tests can observe orphans
    /// left behind by a failed registration completion.
    pub fn credential_count(&self) -> usize {
        self.lock().credentials.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn check_uniqueness(
        &self,
        email: &str,
        external_id: &ExternalId,
    ) -> Result<UniquenessReport, StoreError> {
        let tables = self.lock();
        Ok(UniquenessReport {
            email_taken: tables.identities.values().any(|i| i.email == email),
            external_id_taken: tables
                .identities
                .values()
                .any(|i| &i.external_id == external_id),
        })
    }

    async fn insert_credential(
        &self,
        email: &str,
        credential: PasswordCredential,
    ) -> Result<Id, StoreError> {
        let mut tables = self.lock();
        let existing = tables
            .credentials
            .iter()
            .find(|(_, row)| row.email == email)
            .map(|(id, _)| *id);
        let id = match existing {
            Some(id) => id,
            None => tables.next_id(),
        };
        tables.credentials.insert(
            id,
            CredentialRow {
                email: email.to_string(),
                credential,
            },
        );
        Ok(id)
    }

    async fn insert_identity(&self, identity: NewIdentity) -> Result<Identity, InsertError> {
        let mut tables = self.lock();
        if tables.identities.values().any(|i| i.email == identity.email) {
            return Err(InsertError::Constraint(UniqueIndex::IdentityEmail));
        }
        if tables
            .identities
            .values()
            .any(|i| i.external_id == identity.external_id)
        {
            return Err(InsertError::Constraint(UniqueIndex::IdentityExternalId));
        }
        let id = tables.next_id();
        let identity = Identity { id, identity };
        tables.identities.insert(id, identity.clone());
        Ok(identity)
    }

    async fn identity(&self, id: Id) -> Result<Option<Identity>, StoreError> {
        Ok(self.lock().identities.get(&id).cloned())
    }

    async fn identity_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        Ok(self
            .lock()
            .identities
            .values()
            .find(|i| i.email == email)
            .cloned())
    }

    async fn update_wallet(&self, id: Id, address: &WalletAddress) -> Result<(), StoreError> {
        let mut tables = self.lock();
        let identity = tables
            .identities
            .get_mut(&id)
            .ok_or_else(|| StoreError(format!("no identity with id {id}")))?;
        identity.identity.wallet_address = Some(address.clone());
        Ok(())
    }

    async fn insert_election(&self, election: ElectionCore) -> Result<Election, StoreError> {
        let mut tables = self.lock();
        let id = tables.next_id();
        let election = Election { id, election };
        tables.elections.insert(id, election.clone());
        Ok(election)
    }

    async fn election(&self, id: Id) -> Result<Option<Election>, StoreError> {
        Ok(self.lock().elections.get(&id).cloned())
    }

    async fn insert_candidate(&self, candidate: CandidateCore) -> Result<Candidate, StoreError> {
        let mut tables = self.lock();
        let id = tables.next_id();
        let candidate = Candidate { id, candidate };
        tables.candidates.insert(id, candidate.clone());
        Ok(candidate)
    }

    async fn candidate(&self, id: Id) -> Result<Option<Candidate>, StoreError> {
        Ok(self.lock().candidates.get(&id).cloned())
    }

    async fn candidates(&self, election_id: Id) -> Result<Vec<Candidate>, StoreError> {
        let mut candidates: Vec<Candidate> = self
            .lock()
            .candidates
            .values()
            .filter(|c| c.election_id == election_id)
            .cloned()
            .collect();
        candidates.sort_by_key(|c| c.id);
        Ok(candidates)
    }

    async fn find_vote(&self, voter_id: Id, election_id: Id) -> Result<Option<Vote>, StoreError> {
        Ok(self
            .lock()
            .votes
            .values()
            .find(|v| v.voter_id == voter_id && v.election_id == election_id)
            .cloned())
    }

    async fn insert_vote(&self, vote: NewVote) -> Result<Vote, InsertError> {
        let mut tables = self.lock();
        if tables
            .votes
            .values()
            .any(|v| v.voter_id == vote.voter_id && v.election_id == vote.election_id)
        {
            return Err(InsertError::Constraint(UniqueIndex::VoterElection));
        }
        let id = tables.next_id();
        let vote = Vote { id, vote };
        tables.votes.insert(id, vote.clone());
        Ok(vote)
    }

    async fn tally_votes(&self, election_id: Id) -> Result<Vec<(Id, u64)>, StoreError> {
        let tables = self.lock();
        let mut counts: HashMap<Id, u64> = HashMap::new();
        for vote in tables.votes.values() {
            if vote.election_id == election_id {
                *counts.entry(vote.candidate_id).or_insert(0) += 1;
            }
        }
        Ok(counts.into_iter().collect())
    }
}
