use std::fmt::{self, Display, Formatter};
use std::ops::Deref;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::id::Id;

/// Core election data, as stored. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionCore {
    pub title: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl ElectionCore {
    /// Create a new election.
    pub fn new(
        title: String,
        description: String,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            title,
            description,
            start_time,
            end_time,
        }
    }

    /// Derive the election's temporal status at the given instant.
    /// Active over `[start_time, end_time)`.
    pub fn status_at(&self, now: DateTime<Utc>) -> ElectionStatus {
        if now < self.start_time {
            ElectionStatus::Upcoming
        } else if now < self.end_time {
            ElectionStatus::Active
        } else {
            ElectionStatus::Closed
        }
    }
}

/// Temporal status, derived from the clock rather than stored.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElectionStatus {
    Upcoming,
    Active,
    Closed,
}

impl Display for ElectionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let status = match self {
            ElectionStatus::Upcoming => "upcoming",
            ElectionStatus::Active => "active",
            ElectionStatus::Closed => "closed",
        };
        write!(f, "{status}")
    }
}

/// An election from the store, with its assigned ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Election {
    pub id: Id,
    #[serde(flatten)]
    pub election: ElectionCore,
}

impl Deref for Election {
    type Target = ElectionCore;

    fn deref(&self) -> &Self::Target {
        &self.election
    }
}

/// Core candidate data: descriptive only, read-only to this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateCore {
    pub election_id: Id,
    pub name: String,
    pub department: String,
    pub manifesto: String,
    pub photo_url: Option<String>,
}

/// A candidate from the store, with its assigned ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: Id,
    #[serde(flatten)]
    pub candidate: CandidateCore,
}

impl Deref for Candidate {
    type Target = CandidateCore;

    fn deref(&self) -> &Self::Target {
        &self.candidate
    }
}
