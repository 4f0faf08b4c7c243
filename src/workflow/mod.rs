//! Orchestration of the registration, vote-casting, and results flows over
//! the injected store, notifier, and wallet capabilities.

pub mod registration;
pub mod results;
pub mod voting;

pub use registration::{RegistrationSession, RegistrationWorkflow, Stage};
pub use results::{CandidateTally, ResultsAggregator};
pub use voting::VoteCaster;
