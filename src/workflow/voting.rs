use chrono::{DateTime, Utc};
use log::{info, warn};

use crate::config::Config;
use crate::error::{Conflict, Error, Ineligibility, Result};
use crate::model::election::ElectionStatus;
use crate::model::id::Id;
use crate::model::vote::{VoteCore, VoteReceipt};
use crate::notify::{Message, Notifier};
use crate::store::{InsertError, Store};
use crate::wallet::{self, WalletBinder, WalletProvider};

/// The eligibility-gated, idempotent vote-submission transaction.
///
/// The wallet provider is optional: it is only consulted when the voter
/// has no bound address, and casting without one in that situation is
/// rejected rather than guessed at.
pub struct VoteCaster<'a, S, N> {
    store: &'a S,
    notifier: &'a N,
    config: &'a Config,
    provider: Option<&'a dyn WalletProvider>,
}

impl<'a, S: Store, N: Notifier> VoteCaster<'a, S, N> {
    pub fn new(
        store: &'a S,
        notifier: &'a N,
        config: &'a Config,
        provider: Option<&'a dyn WalletProvider>,
    ) -> Self {
        Self {
            store,
            notifier,
            config,
            provider,
        }
    }

    /// Cast a vote at the current instant.
    pub async fn cast(
        &self,
        voter_id: Id,
        candidate_id: Id,
        election_id: Id,
    ) -> Result<VoteReceipt> {
        self.cast_at(voter_id, candidate_id, election_id, Utc::now())
            .await
    }

    /// Cast a vote, evaluating election status at `now`.
    ///
    /// Preconditions are checked in order, each with its own rejection:
    /// verified voter, active election, known candidate, no prior vote.
    /// The double-vote read is advisory; the store constraint re-checks at
    /// write time and a late violation surfaces as the same rejection.
    pub async fn cast_at(
        &self,
        voter_id: Id,
        candidate_id: Id,
        election_id: Id,
        now: DateTime<Utc>,
    ) -> Result<VoteReceipt> {
        let identity = self
            .store
            .identity(voter_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("identity {voter_id}")))?;
        if !identity.verified {
            return Err(Error::Ineligible(Ineligibility::NotVerified));
        }

        let election = self
            .store
            .election(election_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("election {election_id}")))?;
        let status = election.status_at(now);
        if status != ElectionStatus::Active {
            return Err(Error::Ineligible(Ineligibility::ElectionNotActive(status)));
        }

        let candidate = self
            .store
            .candidate(candidate_id)
            .await?
            .filter(|c| c.election_id == election_id)
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "candidate {candidate_id} in election {election_id}"
                ))
            })?;

        // Advisory only; the unique index below is the real guard.
        if self
            .store
            .find_vote(voter_id, election_id)
            .await?
            .is_some()
        {
            return Err(Error::Conflict(Conflict::Vote));
        }

        // Resolve or establish the wallet binding.
        let address = match &identity.wallet_address {
            Some(address) => address.clone(),
            None => {
                let provider = self.provider.ok_or(Error::WalletRequired)?;
                let address = wallet::obtain_address(provider).await?;
                WalletBinder::new(self.store)
                    .bind(&identity, address)
                    .await?
            }
        };

        // Once this write is issued it runs to a definite success or
        // conflict; there is no cancellation path.
        let vote = VoteCore::new(voter_id, candidate.id, election_id, address);
        let vote = match self.store.insert_vote(vote).await {
            Ok(vote) => vote,
            Err(InsertError::Constraint(_)) => {
                // Lost the race with a concurrent cast; indistinguishable
                // from the advisory rejection above.
                warn!("double-vote constraint fired for voter {voter_id} in election {election_id}");
                return Err(Error::Conflict(Conflict::Vote));
            }
            Err(InsertError::Store(err)) => return Err(err.into()),
        };

        let receipt = VoteReceipt {
            vote_id: vote.id,
            vote_hash: vote.vote_hash.clone(),
        };

        // Confirmation is best-effort; the vote never unwinds.
        let message = Message::vote_confirmation(self.config, &identity.email, &receipt);
        if let Err(err) = self.notifier.send(message).await {
            warn!("vote confirmation failed for voter {voter_id}: {err}");
        }

        info!("vote {} recorded for election {election_id}", vote.id);
        Ok(receipt)
    }
}
