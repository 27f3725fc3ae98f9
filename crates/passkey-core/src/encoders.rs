//! Encoding helpers: base64url for binary blobs, standard base64 for JSON
//! bodies, and the `ed25519:<base58>` key formats.

use base64ct::{Base64, Base64UrlUnpadded, Encoding};

use crate::config::ED25519_SEED_SIZE;
use crate::errors::{ErrorCode, WalletError};

pub const ED25519_KEY_PREFIX: &str = "ed25519:";

// === BASE64URL (URL-SAFE, NO PADDING) ===

pub fn base64_url_encode(data: &[u8]) -> String {
    Base64UrlUnpadded::encode_string(data)
}

pub fn base64_url_decode(input: &str) -> Result<Vec<u8>, WalletError> {
    Base64UrlUnpadded::decode_vec(input)
        .map_err(|e| WalletError::input_invalid(format!("base64url decode error: {}", e)))
}

// === BASE64 STANDARD (FOR JSON/HTTP BODIES) ===

pub fn base64_standard_encode(data: &[u8]) -> String {
    Base64::encode_string(data)
}

pub fn base64_standard_decode(input: &str) -> Result<Vec<u8>, WalletError> {
    Base64::decode_vec(input)
        .map_err(|e| WalletError::input_invalid(format!("base64 decode error: {}", e)))
}

// === NEAR KEY FORMATS ===

/// Encode a 32-byte Ed25519 public key as `ed25519:<base58>`.
pub fn encode_near_public_key(bytes: &[u8; 32]) -> String {
    format!("{}{}", ED25519_KEY_PREFIX, bs58::encode(bytes).into_string())
}

/// Decode an `ed25519:<base58 32 bytes>` public key.
pub fn decode_near_public_key(value: &str) -> Result<[u8; 32], WalletError> {
    let body = value.strip_prefix(ED25519_KEY_PREFIX).ok_or_else(|| {
        WalletError::input_invalid("public key must be in ed25519:<base58> format")
    })?;
    let bytes = bs58::decode(body)
        .into_vec()
        .map_err(|e| WalletError::input_invalid(format!("public key base58 error: {}", e)))?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| WalletError::input_invalid("public key must decode to 32 bytes"))
}

/// Encode a NEAR private key (`ed25519:<base58 seed‖pubkey>`, 64 bytes).
pub fn encode_near_secret_key(seed: &[u8; 32], public_key: &[u8; 32]) -> String {
    let mut bytes = Vec::with_capacity(64);
    bytes.extend_from_slice(seed);
    bytes.extend_from_slice(public_key);
    format!("{}{}", ED25519_KEY_PREFIX, bs58::encode(&bytes).into_string())
}

/// Decode an `ed25519:<base58 64 bytes>` private key into (seed, public key).
pub fn decode_near_secret_key(value: &str) -> Result<([u8; 32], [u8; 32]), WalletError> {
    let body = value.strip_prefix(ED25519_KEY_PREFIX).ok_or_else(|| {
        WalletError::new(
            ErrorCode::KeyNotFound,
            "private key must be in ed25519:<base58> format",
        )
    })?;
    let bytes = bs58::decode(body)
        .into_vec()
        .map_err(|e| WalletError::input_invalid(format!("private key base58 error: {}", e)))?;
    if bytes.len() != 2 * ED25519_SEED_SIZE {
        return Err(WalletError::input_invalid(format!(
            "private key must decode to 64 bytes, got {}",
            bytes.len()
        )));
    }
    let mut seed = [0u8; 32];
    let mut public_key = [0u8; 32];
    seed.copy_from_slice(&bytes[..32]);
    public_key.copy_from_slice(&bytes[32..]);
    Ok((seed, public_key))
}
