//! Transaction execution outcomes and failure classification.
//!
//! `send_tx` returns a loosely-shaped outcome tree; the parts the wallet
//! inspects are the top-level status, each receipt's status, and the logs.
//! Everything else stays as raw JSON.

use base64ct::{Base64, Encoding};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use passkey_core::{ErrorCode, WalletError};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TxExecutionOutcome {
    #[serde(default)]
    pub status: Value,
    #[serde(default)]
    pub transaction: Value,
    #[serde(default)]
    pub transaction_outcome: Value,
    #[serde(default)]
    pub receipts_outcome: Vec<ReceiptOutcome>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReceiptOutcome {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub outcome: OutcomeBody,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OutcomeBody {
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default)]
    pub status: Value,
}

impl TxExecutionOutcome {
    /// Transaction hash as reported by the node, if present.
    pub fn transaction_hash(&self) -> Option<String> {
        self.transaction
            .get("hash")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Base64-decoded `SuccessValue`, when the transaction succeeded with one.
    pub fn success_value(&self) -> Option<Vec<u8>> {
        let value = self.status.get("SuccessValue")?.as_str()?;
        Base64::decode_vec(value).ok()
    }

    pub fn is_success(&self) -> bool {
        self.status.get("Failure").is_none()
            && (self.status.get("SuccessValue").is_some()
                || self.status.get("SuccessReceiptId").is_some())
    }

    pub fn all_logs(&self) -> Vec<String> {
        self.receipts_outcome
            .iter()
            .flat_map(|r| r.outcome.logs.iter().cloned())
            .collect()
    }

    /// Map a failed outcome (top-level or any receipt) to a structured error.
    /// Returns `None` for successful outcomes.
    pub fn classify_failure(&self) -> Option<WalletError> {
        if let Some(failure) = self.status.get("Failure") {
            return Some(classify_failure_value(failure, &self.all_logs()));
        }
        for receipt in &self.receipts_outcome {
            if let Some(failure) = receipt.outcome.status.get("Failure") {
                return Some(classify_failure_value(failure, &self.all_logs()));
            }
        }
        None
    }

    /// Success check that surfaces the classified failure.
    pub fn into_result(self) -> Result<TxExecutionOutcome, WalletError> {
        match self.classify_failure() {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}

/// Kind markers emitted inside `ActionError` failures.
const FAILURE_KINDS: [(&str, ErrorCode, &str); 4] = [
    (
        "AccountAlreadyExists",
        ErrorCode::AccountAlreadyExists,
        "account already exists",
    ),
    (
        "AccountDoesNotExist",
        ErrorCode::AccountDoesNotExist,
        "account does not exist",
    ),
    (
        "InsufficientStake",
        ErrorCode::InsufficientStake,
        "insufficient stake",
    ),
    (
        "LackBalanceForState",
        ErrorCode::InsufficientBalance,
        "insufficient balance for state",
    ),
];

/// Log markers that indicate contract-level breakage rather than an action
/// error kind.
const LOG_MARKERS: [(&str, ErrorCode, &str); 3] = [
    (
        "Cannot deserialize the contract state",
        ErrorCode::ContractStateDeserialize,
        "contract state cannot be deserialized",
    ),
    ("GuestPanic", ErrorCode::GuestPanic, "contract panicked"),
    (
        "Smart contract panicked",
        ErrorCode::GuestPanic,
        "contract panicked",
    ),
];

fn classify_failure_value(failure: &Value, logs: &[String]) -> WalletError {
    let failure_text = failure.to_string();

    for (marker, code, message) in FAILURE_KINDS {
        if failure_text.contains(marker) {
            return WalletError::new(code, message).with_details(failure.clone());
        }
    }

    for log in logs {
        for (marker, code, message) in LOG_MARKERS {
            if log.contains(marker) {
                return WalletError::new(code, format!("{}: {}", message, log))
                    .with_details(failure.clone());
            }
        }
    }
    for (marker, code, message) in LOG_MARKERS {
        if failure_text.contains(marker) {
            return WalletError::new(code, message).with_details(failure.clone());
        }
    }

    WalletError::new(ErrorCode::TxFailure, "transaction failed").with_details(failure.clone())
}
