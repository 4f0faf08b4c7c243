use std::collections::HashMap;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::model::id::Id;
use crate::store::Store;

/// A candidate's share of an election result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateTally {
    pub candidate_id: Id,
    pub candidate_name: String,
    pub votes: u64,
    /// 0 to 100; 0 for every candidate while no votes have been cast.
    pub percentage: f64,
}

/// Read-only, side-effect-free tallying over durably written votes.
pub struct ResultsAggregator<'a, S> {
    store: &'a S,
}

impl<'a, S: Store> ResultsAggregator<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Tally the election. Every candidate appears, zero-vote candidates
    /// included; ordered by vote count descending, candidate id ascending
    /// on ties. Reflects all votes durably written before the call.
    pub async fn tally(&self, election_id: Id) -> Result<Vec<CandidateTally>> {
        self.store
            .election(election_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("election {election_id}")))?;

        let candidates = self.store.candidates(election_id).await?;
        let counts: HashMap<Id, u64> = self
            .store
            .tally_votes(election_id)
            .await?
            .into_iter()
            .collect();
        let total: u64 = counts.values().sum();

        let mut tallies: Vec<CandidateTally> = candidates
            .into_iter()
            .map(|candidate| {
                let votes = counts.get(&candidate.id).copied().unwrap_or(0);
                let percentage = if total > 0 {
                    votes as f64 * 100.0 / total as f64
                } else {
                    0.0
                };
                CandidateTally {
                    candidate_id: candidate.id,
                    candidate_name: candidate.name.clone(),
                    votes,
                    percentage,
                }
            })
            .collect();
        tallies.sort_by(|a, b| {
            b.votes
                .cmp(&a.votes)
                .then(a.candidate_id.cmp(&b.candidate_id))
        });
        Ok(tallies)
    }
}
