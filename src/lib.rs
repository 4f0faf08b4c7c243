//! Core identity-verification and vote-casting logic for a wallet-bound
//! organization voting system.
//!
//! The crate is a library-level contract: the persistent store, the
//! notification sender, and the wallet provider are collaborators injected
//! through the [`store::Store`], [`notify::Notifier`], and
//! [`wallet::WalletProvider`] traits. The presentation layer consumes the
//! workflow state transitions and error signals; nothing here renders or
//! serves anything.
//!
//! The two flows with real invariants live in [`workflow`]: the four-stage
//! registration state machine and the eligibility-gated, idempotent
//! vote-casting transaction.

pub mod config;
pub mod error;
pub mod model;
pub mod notify;
pub mod store;
pub mod wallet;
pub mod workflow;

pub use config::Config;
pub use error::{Error, Result};
