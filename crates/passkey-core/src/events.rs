//! Progress events.
//!
//! Orchestrated operations report progress as value types over a channel;
//! nothing holds a back-pointer into the caller. Phases are ordered: for a
//! single call, emitted phases are non-decreasing (`ActionError` terminates).

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::clock::Clock;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionPhase {
    Preparation,
    GeneratingChallenge,
    UserConfirmation,
    WebauthnAuthentication,
    AuthenticationComplete,
    TransactionSigningProgress,
    TransactionSigningComplete,
    Broadcasting,
    ActionComplete,
    ActionError,
}

impl ActionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionPhase::Preparation => "PREPARATION",
            ActionPhase::GeneratingChallenge => "GENERATING_CHALLENGE",
            ActionPhase::UserConfirmation => "USER_CONFIRMATION",
            ActionPhase::WebauthnAuthentication => "WEBAUTHN_AUTHENTICATION",
            ActionPhase::AuthenticationComplete => "AUTHENTICATION_COMPLETE",
            ActionPhase::TransactionSigningProgress => "TRANSACTION_SIGNING_PROGRESS",
            ActionPhase::TransactionSigningComplete => "TRANSACTION_SIGNING_COMPLETE",
            ActionPhase::Broadcasting => "BROADCASTING",
            ActionPhase::ActionComplete => "ACTION_COMPLETE",
            ActionPhase::ActionError => "ACTION_ERROR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Progress,
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub phase: ActionPhase,
    pub status: ProgressStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    pub timestamp_ms: u64,
}

pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;
pub type ProgressReceiver = mpsc::UnboundedReceiver<ProgressEvent>;

pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Send an event if a listener is attached. A dropped receiver is not an
/// error; progress is best-effort.
pub fn emit(
    sender: Option<&ProgressSender>,
    clock: &dyn Clock,
    phase: ActionPhase,
    status: ProgressStatus,
    message: &str,
    data: Option<serde_json::Value>,
) {
    if let Some(sender) = sender {
        let _ = sender.send(ProgressEvent {
            phase,
            status,
            message: message.to_string(),
            data,
            timestamp_ms: clock.now_ms(),
        });
    }
}
