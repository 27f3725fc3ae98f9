//! Relay authentication service.
//!
//! Server side of the wallet: atomic account creation + on-chain
//! registration, read-only authentication verification, the Shamir 3-pass
//! server-lock service with key rotation and grace keys, session credentials,
//! and the transaction queue that keeps the relay account's nonces
//! contiguous. The HTTP surface is an axum router; everything underneath is
//! framework-agnostic.

pub mod accounts;
pub mod config;
pub mod http;
pub mod queue;
pub mod session;
pub mod shamir_service;

#[cfg(test)]
mod tests;

pub use accounts::AccountService;
pub use config::RelayConfig;
pub use queue::TransactionQueue;
pub use session::SessionService;
pub use shamir_service::ShamirKeyService;
