// Shared constants for the wallet crates. Values that both sides of a
// derivation or an encryption must agree on live here, not in the crates
// that happen to call them first.

/// ChaCha20Poly1305 key size in bytes (256 bits).
pub const CHACHA20_KEY_SIZE: usize = 32;

/// ChaCha20Poly1305 nonce size in bytes (96 bits).
pub const CHACHA20_NONCE_SIZE: usize = 12;

/// Ed25519 seed size in bytes.
pub const ED25519_SEED_SIZE: usize = 32;

/// Ed25519 signature size in bytes.
pub const ED25519_SIGNATURE_SIZE: usize = 64;

/// VRF secret seed size in bytes for deterministic derivation.
pub const VRF_SEED_SIZE: usize = 32;

/// HKDF info for deriving the key-encryption key from the PRF key-salt output.
pub const KEK_HKDF_INFO: &[u8] = b"passkey-kek-v1";

/// HKDF info for deriving the Ed25519 signing seed from the PRF key-salt output.
/// Distinct from [`KEK_HKDF_INFO`] so the same PRF output never yields related keys.
pub const SIGNING_SEED_HKDF_INFO: &[u8] = b"passkey-ed25519-seed-v1";

/// HKDF info for deriving the VRF secret seed from the PRF vrf-salt output.
pub const VRF_SEED_HKDF_INFO: &[u8] = b"passkey-vrf-seed-v1";

/// HKDF info for the AEAD key derived from a Shamir 3-pass KEK.
pub const SHAMIR_AEAD_HKDF_INFO: &[u8] = b"passkey-shamir3pass-kek-aead-v1";

/// HKDF info for the AEAD key that encrypts a VRF keypair at rest.
pub const VRF_KEYPAIR_AEAD_HKDF_INFO: &[u8] = b"passkey-vrf-keypair-aead-v1";

/// Domain separator mixed into every VRF challenge input. The registry
/// contract hashes the same prefix when it re-derives the input on-chain.
pub const VRF_DOMAIN_SEPARATOR: &[u8] = b"passkey_wallet_challenge_v1";

/// Minimum Shamir prime size in bits accepted from configuration.
pub const SHAMIR_MIN_PRIME_BITS: usize = 256;

/// Rejection-sampling attempts when drawing a random Shamir exponent.
pub const SHAMIR_REJECTION_SAMPLING_MAX_ATTEMPTS: u32 = 32;

/// Extra random bytes drawn per sampling attempt to reduce modular bias.
pub const SHAMIR_RANDOM_BYTES_OVERHEAD: usize = 64;

/// Default deployment prime (base64url, big-endian bytes). Every client and
/// the relay must agree on `p`; deployments override it via configuration.
pub const DEFAULT_SHAMIR_P_B64U: &str = "3N5w46AIGjGT2v5Vua_TMD5Ywfa9U2F7-WzW8SNDsIM";

/// Default gas for wallet-issued function calls (30 Tgas).
pub const DEFAULT_FUNCTION_CALL_GAS: u64 = 30_000_000_000_000;

/// Methods of the WebAuthn registry contract the wallet consumes.
pub mod contract_methods {
    pub const VERIFY_AUTHENTICATION_RESPONSE: &str = "verify_authentication_response";
    pub const CREATE_ACCOUNT_AND_REGISTER_USER: &str = "create_account_and_register_user";
    pub const LINK_DEVICE_REGISTER_USER: &str = "link_device_register_user";
    pub const GET_DEVICE_LINKING_ACCOUNT: &str = "get_device_linking_account";
    pub const STORE_DEVICE_LINKING_MAPPING: &str = "store_device_linking_mapping";
    pub const GET_CREDENTIAL_IDS_BY_ACCOUNT: &str = "get_credential_ids_by_account";
    pub const GET_AUTHENTICATORS_BY_USER: &str = "get_authenticators_by_user";
    pub const GET_ALLOWED_ORIGINS: &str = "get_allowed_origins";
}

/// Account-scoped HKDF salt for KEK derivation.
pub fn kek_salt_for_account(account_id: &str) -> String {
    format!("passkey-kek:{}", account_id)
}

/// Account-scoped HKDF salt for signing-seed derivation.
pub fn signing_seed_salt_for_account(account_id: &str) -> String {
    format!("passkey-signing-seed:{}", account_id)
}
