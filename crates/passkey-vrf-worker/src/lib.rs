//! VRF worker: a single-threaded actor that owns the currently-unlocked VRF
//! keypair, produces block-bound challenges, and runs the client side of the
//! Shamir 3-pass server-lock protocol.
//!
//! The private key never leaves the worker task. Callers hold a
//! [`VrfWorkerHandle`] and talk to it through typed messages; all operations
//! serialize on the worker loop, so at most one challenge is ever in flight.

pub mod manager;
pub mod shamir_client;
pub mod types;
pub mod worker;


pub use manager::VrfKeyManager;
pub use types::{DeterministicVrfResult, EncryptedVrfKeypair, VrfStatus};
pub use worker::{VrfWorkerConfig, VrfWorkerHandle};
