use std::ops::Deref;

use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::model::id::Id;
use crate::wallet::WalletAddress;

/// Core vote data, as stored. Immutable once written and the sole source
/// of truth for tallying; there is no update or retraction path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCore {
    pub voter_id: Id,
    pub candidate_id: Id,
    pub election_id: Id,
    pub wallet_address: WalletAddress,
    pub vote_hash: String,
}

impl VoteCore {
    /// Assemble a vote record, deriving its audit hash.
    pub fn new(voter_id: Id, candidate_id: Id, election_id: Id, wallet_address: WalletAddress) -> Self {
        let vote_hash = vote_hash(voter_id, candidate_id, election_id, &wallet_address);
        Self {
            voter_id,
            candidate_id,
            election_id,
            wallet_address,
            vote_hash,
        }
    }
}

/// A vote without an ID, not yet persisted.
pub type NewVote = VoteCore;

/// A vote from the store, with its assigned ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub id: Id,
    #[serde(flatten)]
    pub vote: VoteCore,
}

impl Deref for Vote {
    type Target = VoteCore;

    fn deref(&self) -> &Self::Target {
        &self.vote
    }
}

/// Returned to the voter after a successful cast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteReceipt {
    pub vote_id: Id,
    pub vote_hash: String,
}

/// Deterministic audit digest over a vote's identifying fields: the same
/// logical vote always yields the same hash, so tallies can be reconciled
/// against receipts. The inputs are not secret, so neither is the hash; it
/// proves nothing outside the originating system.
pub fn vote_hash(
    voter_id: Id,
    candidate_id: Id,
    election_id: Id,
    wallet_address: &WalletAddress,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(voter_id.as_u64().to_le_bytes());
    hasher.update(candidate_id.as_u64().to_le_bytes());
    hasher.update(election_id.as_u64().to_le_bytes());
    // Addresses compare case-insensitively; hash the canonical form.
    hasher.update(wallet_address.as_str().to_ascii_lowercase().as_bytes());
    HEXLOWER.encode(&hasher.finalize())
}
