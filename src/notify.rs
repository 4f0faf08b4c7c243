use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;
use crate::model::otp::Code;
use crate::model::vote::VoteReceipt;

/// Delivery failure reported by the sender. Never fails the operation that
/// requested the send; workflows log it and carry on.
#[derive(Debug, Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// An outbound message, fully rendered. Transport is outside this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Message {
    /// Verification-code message, requested when a code is issued.
    pub fn verification_code(config: &Config, to: &str, code: Code) -> Self {
        Self {
            to: to.to_string(),
            subject: format!("{} registration code", config.org_name()),
            body: format!(
                "Your verification code is {code}. Enter it to continue registration."
            ),
        }
    }

    /// Welcome message, requested when registration completes.
    pub fn welcome(config: &Config, to: &str, full_name: &str) -> Self {
        let mut body = format!(
            "Welcome to {}, {full_name}! Your account is verified and your wallet is linked.",
            config.org_name()
        );
        if let Some(contact) = config.support_contact() {
            body.push_str(&format!(" Questions? Contact {contact}."));
        }
        Self {
            to: to.to_string(),
            subject: format!("Welcome to {}", config.org_name()),
            body,
        }
    }

    /// Confirmation message, requested after a vote is recorded.
    pub fn vote_confirmation(config: &Config, to: &str, receipt: &VoteReceipt) -> Self {
        Self {
            to: to.to_string(),
            subject: format!("{} vote confirmation", config.org_name()),
            body: format!(
                "Your vote has been recorded. Receipt hash: {}",
                receipt.vote_hash
            ),
        }
    }
}

/// Delivers rendered messages out-of-band (email in production).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: Message) -> Result<(), NotifyError>;
}

/// Outcome of an operation that requested a notification: the operation
/// itself succeeded either way, delivery may not have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// The triggering operation still stands, but the send failed; the
    /// caller can offer an alternate channel.
    Uncertain,
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_message_carries_the_code() {
        let config = Config::default();
        let code: Code = "271828".parse().unwrap();
        let message = Message::verification_code(&config, "ada@example.org", code);
        assert_eq!(message.to, "ada@example.org");
        assert!(message.body.contains("271828"));
    }

    #[test]
    fn welcome_mentions_support_contact_when_configured() {
        let config = Config::default();
        let message = Message::welcome(&config, "ada@example.org", "Ada Lovelace");
        assert!(message.body.contains("Ada Lovelace"));
        assert!(!message.body.contains("Contact"));
    }
}
