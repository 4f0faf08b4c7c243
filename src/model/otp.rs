use std::convert::TryInto;
use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::distributions::{Distribution, Uniform};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CODE_LENGTH: usize = 6;

/// A one-time verification code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Code {
    #[serde(with = "serialize_code")]
    code: [u8; CODE_LENGTH],
}

impl Code {
    /// Generate a random code.
    pub fn random() -> Self {
        let mut code = [0; CODE_LENGTH];
        let digit_dist = Uniform::from(0..=9);
        let mut rng = rand::thread_rng();
        for digit in &mut code {
            *digit = digit_dist.sample(&mut rng);
        }
        Self { code }
    }
}

/// (De)serialisation for verification codes as digit strings.
mod serialize_code {
    use serde::{
        de::{Error, Unexpected, Visitor},
        Deserializer, Serializer,
    };

    use super::CODE_LENGTH;

    pub fn serialize<S>(code: &[u8; CODE_LENGTH], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&code.iter().map(|n| (n + b'0') as char).collect::<String>())
    }

    struct StrVisitor;

    impl<'de> Visitor<'de> for StrVisitor {
        type Value = [u8; CODE_LENGTH];

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(formatter, "a string of {} digits", CODE_LENGTH)
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: Error,
        {
            if v.len() != CODE_LENGTH {
                return Err(E::invalid_length(
                    v.len(),
                    &format!("a string of {} digit characters", CODE_LENGTH).as_str(),
                ));
            }

            v.chars()
                .map(|c| {
                    c.to_digit(10)
                        .map(|digit| digit as u8)
                        .ok_or_else(|| E::invalid_value(Unexpected::Char(c), &"a digit character"))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(|digits| digits.try_into().unwrap()) // Valid because the input length has been checked
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; CODE_LENGTH], D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_str(StrVisitor)
    }
}

impl Display for Code {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "{}",
            self.code
                .iter()
                .map(|digit| char::from_digit(*digit as u32, 10).unwrap())
                .collect::<String>()
        )
    }
}

impl FromStr for Code {
    type Err = ParseError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        let len = string.len();
        if len != CODE_LENGTH {
            return Err(Self::Err::InvalidLength(len));
        }
        let digits = string
            .chars()
            .map(|c| match c {
                '0'..='9' => Ok(c as u8 - b'0'),
                _ => Err(Self::Err::InvalidChar(c)),
            })
            .collect::<Result<Vec<u8>, Self::Err>>()?;
        Ok(Self {
            code: digits.try_into().unwrap(), // Valid because digits.len() == CODE_LENGTH
        })
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("code must contain exactly {CODE_LENGTH} characters")]
    InvalidLength(usize),
    #[error("code must contain only digits")]
    InvalidChar(char),
}

/// An issued verification challenge. The session holds exactly one; issuing
/// a replacement code invalidates the previous one because the check only
/// ever compares against the current code. There is deliberately no expiry
/// and no attempt limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    code: Code,
    issued_at: DateTime<Utc>,
}

impl Challenge {
    /// Issue a fresh challenge.
    pub fn issue() -> Self {
        Self {
            code: Code::random(),
            issued_at: Utc::now(),
        }
    }

    /// Replace the code, invalidating the previous one.
    pub fn reissue(&mut self) {
        self.code = Code::random();
        self.issued_at = Utc::now();
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Check a submitted code against the issued one. Anything that does
    /// not parse as a code is a mismatch, including empty input.
    pub fn check(&self, submitted: &str) -> CodeCheck {
        match submitted.parse::<Code>() {
            Ok(code) if code == self.code => CodeCheck::Valid,
            _ => CodeCheck::Mismatch,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeCheck {
    Valid,
    Mismatch,
}
