//! The repository contract over the external persistent store.
//!
//! The store's unique constraints are the sole arbiter of correctness for
//! registration and double-vote races; every read-side check in this crate
//! is advisory, for fast and field-attributable user feedback only.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::election::{Candidate, CandidateCore, Election, ElectionCore};
use crate::model::id::Id;
use crate::model::identity::{ExternalId, Identity, NewIdentity, PasswordCredential};
use crate::model::vote::{NewVote, Vote};
use crate::wallet::WalletAddress;

/// A store-level failure outside any constraint: connectivity, timeouts,
/// malformed data. Retryable by the caller; never retried here, since a
/// retried write risks duplicate side effects.
#[derive(Debug, Error)]
#[error("store unavailable: {0}")]
pub struct StoreError(pub String);

/// The unique index that rejected a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueIndex {
    IdentityEmail,
    IdentityExternalId,
    VoterElection,
}

/// Failure modes of an insert: a unique constraint fired, or the store
/// itself failed.
#[derive(Debug, Error)]
pub enum InsertError {
    #[error("unique constraint violated: {0:?}")]
    Constraint(UniqueIndex),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Advisory uniqueness report for registration feedback. Never the sole
/// guard; the insert constraint remains authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UniquenessReport {
    pub email_taken: bool,
    pub external_id_taken: bool,
}

impl UniquenessReport {
    pub fn any_taken(self) -> bool {
        self.email_taken || self.external_id_taken
    }
}

/// Typed repository over the external store. Implementations must enforce
/// the unique indexes named by [`UniqueIndex`] at write time.
#[async_trait]
pub trait Store: Send + Sync {
    // Identities.

    /// Advisory read: which of the given keys are already registered.
    async fn check_uniqueness(
        &self,
        email: &str,
        external_id: &ExternalId,
    ) -> Result<UniquenessReport, StoreError>;

    /// Create the durable login credential for an account. Re-running a
    /// failed registration completion replaces the previous credential for
    /// the same email rather than erroring.
    async fn insert_credential(
        &self,
        email: &str,
        credential: PasswordCredential,
    ) -> Result<Id, StoreError>;

    /// Insert a new identity, enforcing the email and external-id unique
    /// indexes atomically with the write.
    async fn insert_identity(&self, identity: NewIdentity) -> Result<Identity, InsertError>;

    async fn identity(&self, id: Id) -> Result<Option<Identity>, StoreError>;

    async fn identity_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError>;

    /// Overwrite the identity's wallet binding.
    async fn update_wallet(&self, id: Id, address: &WalletAddress) -> Result<(), StoreError>;

    // Elections and candidates.

    async fn insert_election(&self, election: ElectionCore) -> Result<Election, StoreError>;

    async fn election(&self, id: Id) -> Result<Option<Election>, StoreError>;

    async fn insert_candidate(&self, candidate: CandidateCore) -> Result<Candidate, StoreError>;

    async fn candidate(&self, id: Id) -> Result<Option<Candidate>, StoreError>;

    /// All candidates standing in the election, ordered by id.
    async fn candidates(&self, election_id: Id) -> Result<Vec<Candidate>, StoreError>;

    // Votes.

    /// Advisory read: the voter's existing vote in this election, if any.
    async fn find_vote(&self, voter_id: Id, election_id: Id) -> Result<Option<Vote>, StoreError>;

    /// Insert a vote, enforcing the `(voter_id, election_id)` unique index
    /// atomically with the write.
    async fn insert_vote(&self, vote: NewVote) -> Result<Vote, InsertError>;

    /// Server-side aggregation: per-candidate vote counts for the
    /// election. Candidates with no votes may be absent from the result.
    async fn tally_votes(&self, election_id: Id) -> Result<Vec<(Id, u64)>, StoreError>;
}
