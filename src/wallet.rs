use std::fmt::Display;
use std::str::FromStr;

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{Error, Result};
use crate::model::identity::Identity;
use crate::store::Store;

const ADDRESS_HEX_DIGITS: usize = 40;

/// A wallet address as returned by the provider: `0x` plus 40 hex digits.
/// Case is preserved for display but ignored for equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletAddress(String);

impl WalletAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for WalletAddress {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for WalletAddress {}

impl Display for WalletAddress {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(formatter)
    }
}

impl FromStr for WalletAddress {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .ok_or(ParseAddressError::MissingPrefix)?;
        if digits.len() != ADDRESS_HEX_DIGITS {
            return Err(ParseAddressError::InvalidLength(digits.len()));
        }
        match digits.chars().find(|c| !c.is_ascii_hexdigit()) {
            Some(c) => Err(ParseAddressError::InvalidChar(c)),
            None => Ok(Self(s.to_string())),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseAddressError {
    #[error("address must start with 0x")]
    MissingPrefix,
    #[error("address must contain exactly {ADDRESS_HEX_DIGITS} hex digits, found {0}")]
    InvalidLength(usize),
    #[error("address must contain only hex digits, found '{0}'")]
    InvalidChar(char),
}

/// Outcome of asking the provider for a wallet connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletOutcome {
    /// The user approved and the provider returned an address.
    Connected(WalletAddress),
    /// The user declined or cancelled.
    Declined,
}

/// Transport-level provider failure, distinct from a user decline.
#[derive(Debug, Error)]
#[error("wallet provider unavailable: {0}")]
pub struct WalletError(pub String);

/// An external signer that returns an address after user approval. The
/// call blocks the calling session until the user responds; it holds no
/// lock that other users' operations would wait on.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    async fn connect(&self) -> std::result::Result<WalletOutcome, WalletError>;
}

/// Ask the provider to connect, mapping a decline and a transport failure
/// to their distinct errors so callers can message them differently.
pub async fn obtain_address(provider: &dyn WalletProvider) -> Result<WalletAddress> {
    match provider.connect().await {
        Ok(WalletOutcome::Connected(address)) => Ok(address),
        Ok(WalletOutcome::Declined) => Err(Error::WalletDeclined),
        Err(err) => {
            warn!("{err}");
            Err(Error::WalletUnavailable)
        }
    }
}

/// Associates wallet addresses with persisted identities, idempotently.
pub struct WalletBinder<'a, S> {
    store: &'a S,
}

impl<'a, S: Store> WalletBinder<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Bind `address` to the identity. Rebinding the same address is a
    /// no-op success; a different address overwrites the previous binding
    /// (last writer wins, since binding is a single-user action).
    pub async fn bind(&self, identity: &Identity, address: WalletAddress) -> Result<WalletAddress> {
        match &identity.wallet_address {
            Some(current) if *current == address => {
                debug!("wallet already bound for identity {}", identity.id);
                return Ok(address);
            }
            Some(current) => {
                info!(
                    "rebinding wallet for identity {}: {current} -> {address}",
                    identity.id
                );
            }
            None => {}
        }
        self.store.update_wallet(identity.id, &address).await?;
        Ok(address)
    }
}
