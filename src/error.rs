use std::fmt::{self, Display, Formatter};

use serde::Serialize;
use thiserror::Error;

use crate::model::election::ElectionStatus;
use crate::store::{StoreError, UniqueIndex};
use crate::workflow::registration::Stage;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input. Every failing field is reported together so the
    /// user corrects everything in one pass.
    #[error("validation failed on {} field(s)", .0.len())]
    Validation(Vec<FieldError>),
    /// A uniqueness violation, attributed to what collided. Early advisory
    /// hits and late store-constraint violations both surface here and are
    /// indistinguishable to the caller.
    #[error("conflict: {0}")]
    Conflict(Conflict),
    /// The caller cannot immediately self-correct this.
    #[error("not eligible: {0}")]
    Ineligible(Ineligibility),
    /// The submitted verification code did not match the issued one.
    #[error("verification code mismatch")]
    CodeMismatch,
    /// The operation is not defined for the session's current stage.
    #[error("operation not valid in registration stage {0:?}")]
    InvalidStage(Stage),
    /// The user declined the wallet connection. Retry by re-initiating.
    #[error("wallet connection declined")]
    WalletDeclined,
    /// The wallet provider could not be reached. Retryable.
    #[error("wallet provider unavailable")]
    WalletUnavailable,
    /// No wallet is bound and no provider capability was supplied.
    #[error("no wallet is bound and no wallet provider is available")]
    WalletRequired,
    /// Creating the durable account credential failed. Deliberately
    /// generic so the caller cannot tell which step of completion broke.
    #[error("account creation failed")]
    AccountCreation,
    /// The store failed on a primary operation. Surfaced, never retried
    /// here; the user re-initiates the action.
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("not found: {0}")]
    NotFound(String),
}

/// A single field that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: Field,
    pub message: String,
}

impl FieldError {
    pub fn new(field: Field, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl Display for FieldError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Registration form fields, for attributing validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    FullName,
    Email,
    Phone,
    ExternalId,
    Password,
    ConfirmPassword,
}

impl Display for Field {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::FullName => "full name",
            Field::Email => "email",
            Field::Phone => "phone",
            Field::ExternalId => "organization id",
            Field::Password => "password",
            Field::ConfirmPassword => "password confirmation",
        };
        write!(f, "{name}")
    }
}

/// What a uniqueness conflict collided on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Conflict {
    #[error("email address already registered")]
    Email,
    #[error("organization id already registered")]
    ExternalId,
    #[error("email address and organization id already registered")]
    EmailAndExternalId,
    #[error("a vote has already been cast in this election")]
    Vote,
}

impl From<UniqueIndex> for Conflict {
    /// Attribute a store-constraint violation the same way the advisory
    /// check would have.
    fn from(index: UniqueIndex) -> Self {
        match index {
            UniqueIndex::IdentityEmail => Conflict::Email,
            UniqueIndex::IdentityExternalId => Conflict::ExternalId,
            UniqueIndex::VoterElection => Conflict::Vote,
        }
    }
}

/// Why a voter is not eligible to proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Ineligibility {
    #[error("identity is not verified")]
    NotVerified,
    #[error("election is not active (currently {0})")]
    ElectionNotActive(ElectionStatus),
}
