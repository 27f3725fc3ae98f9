//! Wallet-frame orchestration: the validate → context → challenge →
//! authenticate → sign → broadcast pipeline, user registration, and the
//! two-device linking protocol.
//!
//! Ambient host facts (relying-party id, cameras, QR rendering) are injected
//! capabilities; the orchestrator owns no global state and reaches the
//! workers only through their handles.

pub mod credentials;
pub mod device_linking;
pub mod orchestrator;
pub mod registration;
pub mod router;

#[cfg(test)]
mod tests;

pub use credentials::{
    CreateCredentialRequest, CredentialProvider, GetAssertionRequest, HostInfo,
};
pub use orchestrator::{
    BroadcastResult, CallHooks, ExecuteOptions, ExecuteResult, TransactionOrchestrator,
};
