//! Account identifiers.
//!
//! A NEAR-style account id is 2–64 characters of `[a-z0-9._-]`, where the
//! separators `.`, `-`, `_` never lead, trail, or repeat back-to-back.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{ErrorCode, WalletError};

pub const MIN_ACCOUNT_ID_LEN: usize = 2;
pub const MAX_ACCOUNT_ID_LEN: usize = 64;

/// Validated account identifier. Immutable once constructed.
#[derive(
    BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(value: impl Into<String>) -> Result<Self, WalletError> {
        let value = value.into();
        validate_account_id(&value)?;
        Ok(AccountId(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AccountId {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AccountId::new(s)
    }
}

impl AsRef<str> for AccountId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = <std::string::String as Deserialize>::deserialize(deserializer)?;
        AccountId::new(value).map_err(serde::de::Error::custom)
    }
}

/// Validate an account id without constructing one.
pub fn validate_account_id(value: &str) -> Result<(), WalletError> {
    if value.len() < MIN_ACCOUNT_ID_LEN || value.len() > MAX_ACCOUNT_ID_LEN {
        return Err(WalletError::new(
            ErrorCode::AccountIdInvalid,
            format!(
                "account id must be {}-{} characters, got {}",
                MIN_ACCOUNT_ID_LEN,
                MAX_ACCOUNT_ID_LEN,
                value.len()
            ),
        ));
    }

    // Separators must sit between alphanumeric runs.
    let mut prev_was_separator = true;
    for &byte in value.as_bytes() {
        match byte {
            b'a'..=b'z' | b'0'..=b'9' => prev_was_separator = false,
            b'.' | b'-' | b'_' => {
                if prev_was_separator {
                    return Err(WalletError::new(
                        ErrorCode::AccountIdInvalid,
                        format!("account id '{}' has a misplaced separator", value),
                    ));
                }
                prev_was_separator = true;
            }
            _ => {
                return Err(WalletError::new(
                    ErrorCode::AccountIdInvalid,
                    format!("account id '{}' contains an invalid character", value),
                ));
            }
        }
    }
    if prev_was_separator {
        return Err(WalletError::new(
            ErrorCode::AccountIdInvalid,
            format!("account id '{}' ends with a separator", value),
        ));
    }
    Ok(())
}
