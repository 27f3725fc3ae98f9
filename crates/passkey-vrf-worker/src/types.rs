//! Message payloads for the VRF worker.

use serde::{Deserialize, Serialize};

use passkey_core::AccountId;

/// Encrypted VRF keypair at rest: ChaCha20Poly1305 over the bincode keypair,
/// key derived from the PRF vrf-salt output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedVrfKeypair {
    pub ciphertext_b64u: String,
    pub nonce_b64u: String,
}

/// `is_active` result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VrfStatus {
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<AccountId>,
    pub session_duration_ms: u64,
}

/// Result of deterministic VRF derivation: the public key, the at-rest
/// ciphertext for local storage, and optionally a challenge generated in the
/// same pass.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeterministicVrfResult {
    pub vrf_public_key_b64u: String,
    pub encrypted: EncryptedVrfKeypair,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge: Option<passkey_core::vrf::VrfChallenge>,
}

/// Result of bootstrapping a random in-memory keypair before any PRF exists.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BootstrapVrfResult {
    pub vrf_public_key_b64u: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge: Option<passkey_core::vrf::VrfChallenge>,
}
