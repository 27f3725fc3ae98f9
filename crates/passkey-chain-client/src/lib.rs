//! Minimal JSON-RPC client for a NEAR-style chain, plus the signing-context
//! cache ([`nonce::NonceManager`]) that the transaction orchestrator reads.
//!
//! The client knows nothing about signing. It exposes exactly the operations
//! the wallet consumes: `view_account`, `view_access_key`,
//! `view_access_key_list`, `view_block`, `call_function` (view), `send_tx`.

pub mod nonce;
pub mod outcome;
pub mod rpc;
pub mod views;

#[cfg(test)]
mod tests;

pub use nonce::{NonceManager, SigningContext};
pub use rpc::{ChainRpc, Finality, HttpChainClient, TxWaitUntil};
