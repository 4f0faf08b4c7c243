use std::fmt::Display;
use std::str::FromStr;

use phonenumber::{Mode, PhoneNumber};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A phone number, validated on parse and stored normalized to E.164 so
/// equality is well-defined.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Phone(String);

impl Phone {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid phone number")]
pub struct ParsePhoneError;

impl FromStr for Phone {
    type Err = ParsePhoneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let number = s.parse::<PhoneNumber>().map_err(|_| ParsePhoneError)?;
        Ok(Self(number.format().mode(Mode::E164).to_string()))
    }
}

impl Display for Phone {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        self.0.fmt(formatter)
    }
}
