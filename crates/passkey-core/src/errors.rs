//! Structured errors shared by every crate in the workspace.
//!
//! A [`WalletError`] is `{ code, message, details? }`: the shape that crosses
//! the isolation transport and the relay HTTP surface unchanged. Workers must
//! scrub secret material out of any text that ends up in `message`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error taxonomy. One code per externally observable failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Input / validation
    InputInvalid,
    AccountIdInvalid,
    ActionInvalid,
    // Preconditions
    UserNotFound,
    KeyNotFound,
    VrfLocked,
    VrfWrongUser,
    // Credential ceremonies
    CredentialDenied,
    CredentialRequestBusy,
    PrfUnavailable,
    // Crypto
    AeadFail,
    VrfVerifyFail,
    AssertionInvalid,
    SigFail,
    // Chain-side outcomes
    AccountAlreadyExists,
    AccountDoesNotExist,
    InsufficientStake,
    InsufficientBalance,
    GuestPanic,
    ContractStateDeserialize,
    TxFailure,
    NonceGap,
    // Transport
    RpcHttp,
    RpcEmpty,
    RpcError,
    IpcTimeout,
    IpcNotReady,
    // Shamir 3-pass
    ShamirNotInit,
    UnknownKey,
    // Device linking
    SessionExpired,
    AuthorizationTimeout,
    RegistrationFailed,
    // Caller-driven cancellation
    Cancelled,
    // Catch-all for internal invariant violations
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InputInvalid => "INPUT_INVALID",
            ErrorCode::AccountIdInvalid => "ACCOUNT_ID_INVALID",
            ErrorCode::ActionInvalid => "ACTION_INVALID",
            ErrorCode::UserNotFound => "USER_NOT_FOUND",
            ErrorCode::KeyNotFound => "KEY_NOT_FOUND",
            ErrorCode::VrfLocked => "VRF_LOCKED",
            ErrorCode::VrfWrongUser => "VRF_WRONG_USER",
            ErrorCode::CredentialDenied => "CREDENTIAL_DENIED",
            ErrorCode::CredentialRequestBusy => "CREDENTIAL_REQUEST_BUSY",
            ErrorCode::PrfUnavailable => "PRF_UNAVAILABLE",
            ErrorCode::AeadFail => "AEAD_FAIL",
            ErrorCode::VrfVerifyFail => "VRF_VERIFY_FAIL",
            ErrorCode::AssertionInvalid => "ASSERTION_INVALID",
            ErrorCode::SigFail => "SIG_FAIL",
            ErrorCode::AccountAlreadyExists => "ACCOUNT_ALREADY_EXISTS",
            ErrorCode::AccountDoesNotExist => "ACCOUNT_DOES_NOT_EXIST",
            ErrorCode::InsufficientStake => "INSUFFICIENT_STAKE",
            ErrorCode::InsufficientBalance => "INSUFFICIENT_BALANCE",
            ErrorCode::GuestPanic => "GUEST_PANIC",
            ErrorCode::ContractStateDeserialize => "CONTRACT_STATE_DESERIALIZE",
            ErrorCode::TxFailure => "TX_FAILURE",
            ErrorCode::NonceGap => "NONCE_GAP",
            ErrorCode::RpcHttp => "RPC_HTTP",
            ErrorCode::RpcEmpty => "RPC_EMPTY",
            ErrorCode::RpcError => "RPC_ERROR",
            ErrorCode::IpcTimeout => "IPC_TIMEOUT",
            ErrorCode::IpcNotReady => "IPC_NOT_READY",
            ErrorCode::ShamirNotInit => "SHAMIR_NOT_INIT",
            ErrorCode::UnknownKey => "UNKNOWN_KEY",
            ErrorCode::SessionExpired => "SESSION_EXPIRED",
            ErrorCode::AuthorizationTimeout => "AUTHORIZATION_TIMEOUT",
            ErrorCode::RegistrationFailed => "REGISTRATION_FAILED",
            ErrorCode::Cancelled => "CANCELLED",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The workspace-wide error type. Cloneable so it can travel through shared
/// (coalesced) futures, serializable so it can cross process boundaries.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct WalletError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

pub type WalletResult<T> = Result<T, WalletError>;

impl WalletError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        WalletError {
            code,
            message: scrub_secret_fields(&message.into()),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn input_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InputInvalid, message)
    }

    pub fn action_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ActionInvalid, message)
    }

    pub fn aead_fail(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AeadFail, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }
}

// === SECRET SCRUBBING ===
//
// Error text can embed serialized payloads (serde gives back the offending
// value). Redact the values of known secret-bearing JSON fields before the
// text leaves the worker; structural details stay intact.

const SECRET_FIELDS: [&str; 8] = [
    "nearPrivateKey",
    "near_private_key",
    "privateKey",
    "private_key",
    "keySaltB64u",
    "key_salt_b64u",
    "vrfSaltB64u",
    "vrf_salt_b64u",
];

const REDACTED: &str = "[REDACTED]";

/// Redact the string values of secret-bearing JSON fields in `message`.
/// Handles both plain (`"key":"value"`) and escaped (`\"key\":\"value\"`)
/// encodings, since payloads are often stringified JSON inside JSON.
pub fn scrub_secret_fields(message: &str) -> String {
    let mut out = message.to_string();
    for field in SECRET_FIELDS {
        out = scrub_field(&out, &format!("\"{}\"", field), "\"");
        out = scrub_field(&out, &format!("\\\"{}\\\"", field), "\\\"");
    }
    out
}

fn scrub_field(input: &str, key_pattern: &str, quote: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some((before, after_key)) = rest.split_once(key_pattern) {
        out.push_str(before);
        out.push_str(key_pattern);
        rest = after_key;

        // Expect `: "<value>"` (with arbitrary whitespace); anything else is
        // left untouched.
        let Some(after_colon) = rest.trim_start().strip_prefix(':') else {
            continue;
        };
        let value_start = after_colon.trim_start();
        let Some(after_quote) = value_start.strip_prefix(quote) else {
            continue;
        };
        let Some(end) = find_closing_quote(after_quote, quote) else {
            out.push_str(":");
            out.push_str(quote);
            out.push_str(REDACTED);
            out.push_str(quote);
            return out;
        };
        out.push(':');
        out.push_str(quote);
        out.push_str(REDACTED);
        out.push_str(quote);
        rest = &after_quote[end..];
    }

    out.push_str(rest);
    out
}

fn find_closing_quote(s: &str, quote: &str) -> Option<usize> {
    if quote == "\\\"" {
        return s.find("\\\"").map(|idx| idx + 2);
    }
    let mut escaped = false;
    for (idx, ch) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '"' => return Some(idx + 1),
            _ => {}
        }
    }
    None
}
