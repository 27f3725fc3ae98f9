//! Signer worker: a single-threaded actor that is the only place a plaintext
//! signing key ever exists, and only for the duration of one signing call.
//!
//! Two signing paths: the passkey path (verify the VRF challenge and the
//! WebAuthn assertion on-chain, derive the KEK from the assertion's PRF
//! output, decrypt the stored key, sign a batch with consecutive nonces) and
//! the raw-keypair path used while device linking spends an ephemeral key.

pub mod config;
pub mod nep413;
pub mod signing;
pub mod types;
pub mod verify;
pub mod worker;

#[cfg(test)]
mod tests;

pub use types::{
    DeriveKeypairRequest, DeriveKeypairResult, SignTransactionsRequest, SignTransactionsResult,
    SignWithKeypairRequest, TransactionSigningRequest,
};
pub use worker::{SignerWorkerConfig, SignerWorkerHandle};
