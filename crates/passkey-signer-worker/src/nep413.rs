//! NEP-413 off-chain message signing.
//!
//! The signed digest is `sha256(borsh(prefix) ‖ borsh(payload))` where the
//! prefix is `2^31 + 413`, which keeps signed messages from ever being valid
//! transactions.

use borsh::BorshSerialize;
use ed25519_dalek::{Signer as _, SigningKey};
use sha2::{Digest, Sha256};

use passkey_core::encoders::{base64_standard_encode, base64_url_decode};
use passkey_core::errors::{WalletError, WalletResult};

pub const NEP413_PREFIX: u32 = (1u32 << 31) + 413;

/// Borsh field order is normative.
#[derive(BorshSerialize, Clone, Debug)]
pub struct Nep413Payload {
    pub message: String,
    pub nonce: [u8; 32],
    pub recipient: String,
    pub callback_url: Option<String>,
}

impl Nep413Payload {
    pub fn new(
        message: String,
        recipient: String,
        nonce_b64u: &str,
        callback_url: Option<String>,
    ) -> WalletResult<Self> {
        let nonce_bytes = base64_url_decode(nonce_b64u)?;
        let nonce: [u8; 32] = nonce_bytes
            .as_slice()
            .try_into()
            .map_err(|_| WalletError::input_invalid("NEP-413 nonce must be 32 bytes"))?;
        Ok(Nep413Payload {
            message,
            nonce,
            recipient,
            callback_url,
        })
    }

    pub fn signing_digest(&self) -> WalletResult<[u8; 32]> {
        let mut encoded = borsh::to_vec(&NEP413_PREFIX)
            .map_err(|e| WalletError::internal(format!("prefix encode failed: {}", e)))?;
        let payload = borsh::to_vec(self)
            .map_err(|e| WalletError::internal(format!("payload encode failed: {}", e)))?;
        encoded.extend_from_slice(&payload);
        let digest = Sha256::digest(&encoded);
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        Ok(out)
    }
}

/// Sign a NEP-413 payload. Returns the standard-base64 signature, the form
/// verifiers expect.
pub fn sign_nep413(signing_key: &SigningKey, payload: &Nep413Payload) -> WalletResult<String> {
    let digest = payload.signing_digest()?;
    let signature = signing_key.sign(&digest);
    Ok(base64_standard_encode(&signature.to_bytes()))
}
