use std::fmt::Display;
use std::ops::{Deref, DerefMut};
use std::str::FromStr;

use argon2::Config as Argon2Config;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{Field, FieldError};
use crate::model::id::Id;
use crate::model::phone::Phone;
use crate::wallet::WalletAddress;

/// Password policy: minimum length accepted at registration.
pub const MIN_PASSWORD_LENGTH: usize = 6;

const EXTERNAL_ID_MIN: usize = 6;
const EXTERNAL_ID_MAX: usize = 12;

/// An organization-issued identifier: 6 to 12 alphanumeric characters,
/// unique across all registrants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalId(String);

impl ExternalId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ExternalId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(formatter)
    }
}

impl FromStr for ExternalId {
    type Err = ParseExternalIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let len = s.chars().count();
        if !(EXTERNAL_ID_MIN..=EXTERNAL_ID_MAX).contains(&len) {
            return Err(ParseExternalIdError::InvalidLength(len));
        }
        match s.chars().find(|c| !c.is_ascii_alphanumeric()) {
            Some(c) => Err(ParseExternalIdError::InvalidChar(c)),
            None => Ok(Self(s.to_string())),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseExternalIdError {
    #[error("organization id must be {EXTERNAL_ID_MIN} to {EXTERNAL_ID_MAX} characters, found {0}")]
    InvalidLength(usize),
    #[error("organization id must contain only letters and digits, found '{0}'")]
    InvalidChar(char),
}

/// An argon2-encoded password credential. The plaintext is hashed at
/// creation and never stored or compared directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PasswordCredential(String);

impl PasswordCredential {
    /// Hash a plaintext password into a storable credential.
    pub fn derive(password: &str) -> Result<Self, argon2::Error> {
        // 16 bytes is recommended for password hashing:
        //  https://en.wikipedia.org/wiki/Argon2
        let mut salt = [0_u8; 16];
        rand::thread_rng().fill(&mut salt);
        argon2::hash_encoded(password.as_bytes(), &salt, &Argon2Config::default()).map(Self)
    }

    /// Check whether the given password matches this credential.
    pub fn verify<T: AsRef<[u8]>>(&self, password: T) -> bool {
        argon2::verify_encoded(&self.0, password.as_ref()).unwrap_or(false)
    }
}

/// A registration form as submitted by the user. Nothing here is trusted
/// until [`RegistrationForm::validate`] has passed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationForm {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub external_id: String,
    pub password: String,
    pub confirm_password: String,
}

impl RegistrationForm {
    /// Validate every field, collecting all failures rather than stopping
    /// at the first so the user corrects everything in one pass. The email
    /// is normalized to lowercase.
    pub fn validate(&self) -> Result<ValidForm, Vec<FieldError>> {
        let mut errors = Vec::new();

        let full_name = self.full_name.trim();
        if full_name.is_empty() {
            errors.push(FieldError::new(Field::FullName, "full name must not be empty"));
        }

        let email = self.email.trim().to_ascii_lowercase();
        if !email_is_valid(&email) {
            errors.push(FieldError::new(Field::Email, "email address is not valid"));
        }

        let phone = self.phone.trim().parse::<Phone>();
        if phone.is_err() {
            errors.push(FieldError::new(Field::Phone, "phone number is not valid"));
        }

        let external_id = self.external_id.trim().parse::<ExternalId>();
        if let Err(err) = &external_id {
            errors.push(FieldError::new(Field::ExternalId, err.to_string()));
        }

        if self.password.len() < MIN_PASSWORD_LENGTH {
            errors.push(FieldError::new(
                Field::Password,
                format!("password must be at least {MIN_PASSWORD_LENGTH} characters"),
            ));
        }

        if self.confirm_password != self.password {
            errors.push(FieldError::new(
                Field::ConfirmPassword,
                "passwords do not match",
            ));
        }

        match (phone, external_id) {
            (Ok(phone), Ok(external_id)) if errors.is_empty() => Ok(ValidForm {
                full_name: full_name.to_string(),
                email,
                phone,
                external_id,
                password: self.password.clone(),
            }),
            _ => Err(errors),
        }
    }
}

/// A validated form: typed fields, ready to become an identity once the
/// verification code has been confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidForm {
    pub full_name: String,
    pub email: String,
    pub phone: Phone,
    pub external_id: ExternalId,
    pub password: String,
}

/// Core registrant data, as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityCore {
    pub full_name: String,
    /// Unique across all identities; normalized to lowercase.
    pub email: String,
    /// Unique across all identities.
    pub external_id: ExternalId,
    pub phone: Phone,
    /// Opaque handle to the durable login credential.
    pub credential_id: Id,
    /// Absent until a wallet has been bound.
    pub wallet_address: Option<WalletAddress>,
    /// True only after a successful code check; set atomically with record
    /// creation. There is no unverified record shape.
    pub verified: bool,
}

impl IdentityCore {
    /// Build a verified identity record from a validated form. Only called
    /// after the verification code has been confirmed.
    pub fn verified(form: &ValidForm, credential_id: Id, wallet_address: WalletAddress) -> Self {
        Self {
            full_name: form.full_name.clone(),
            email: form.email.clone(),
            external_id: form.external_id.clone(),
            phone: form.phone.clone(),
            credential_id,
            wallet_address: Some(wallet_address),
            verified: true,
        }
    }
}

/// An identity without an ID, not yet persisted.
pub type NewIdentity = IdentityCore;

/// A registrant from the store, with its assigned ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Id,
    #[serde(flatten)]
    pub identity: IdentityCore,
}

impl Deref for Identity {
    type Target = IdentityCore;

    fn deref(&self) -> &Self::Target {
        &self.identity
    }
}

impl DerefMut for Identity {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.identity
    }
}

/// Syntactic email check: one `@`, non-empty local part, dot-separated
/// domain with no empty labels, no whitespace.
fn email_is_valid(email: &str) -> bool {
    if email.contains(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && domain.split('.').all(|label| !label.is_empty())
        }
        None => false,
    }
}
