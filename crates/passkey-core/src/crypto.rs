//! PRF-bound key derivation and encryption-at-rest.
//!
//! The authenticator's PRF extension yields two independent outputs per
//! ceremony. The key-salt output drives both the KEK (which encrypts the
//! signing seed at rest) and the deterministic signing seed itself, under
//! different HKDF info strings; the vrf-salt output drives VRF key derivation
//! (see [`crate::vrf`]). None of these derivations may log or return raw
//! material outside zeroizing containers.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use ed25519_dalek::{Signer as _, SigningKey};
use getrandom::getrandom;
use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::account::AccountId;
use crate::config::{
    kek_salt_for_account, signing_seed_salt_for_account, CHACHA20_KEY_SIZE, CHACHA20_NONCE_SIZE,
    ED25519_SEED_SIZE, KEK_HKDF_INFO, SIGNING_SEED_HKDF_INFO,
};
use crate::encoders::{
    base64_url_decode, base64_url_encode, encode_near_public_key, encode_near_secret_key,
};
use crate::errors::{ErrorCode, WalletError};

/// AEAD ciphertext over a 32-byte signing seed, bound to its account id via
/// associated data. This is the at-rest form in the `near_keys` namespace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPrivateKey {
    pub ciphertext_b64u: String,
    pub nonce_b64u: String,
}

/// Derive the key-encryption key from the PRF key-salt output.
pub fn derive_kek(
    prf_key_salt_b64u: &str,
    account_id: &AccountId,
) -> Result<Zeroizing<[u8; CHACHA20_KEY_SIZE]>, WalletError> {
    let prf_output = Zeroizing::new(base64_url_decode(prf_key_salt_b64u)?);
    if prf_output.is_empty() {
        return Err(WalletError::new(
            ErrorCode::PrfUnavailable,
            "empty PRF key-salt output",
        ));
    }
    let salt = kek_salt_for_account(account_id.as_str());
    let hk = Hkdf::<Sha256>::new(Some(salt.as_bytes()), &prf_output);
    let mut kek = Zeroizing::new([0u8; CHACHA20_KEY_SIZE]);
    hk.expand(KEK_HKDF_INFO, kek.as_mut())
        .map_err(|_| WalletError::internal("HKDF expand failed for KEK"))?;
    Ok(kek)
}

/// Encrypt a signing seed under a KEK with a fresh random nonce.
pub fn encrypt_private_key(
    seed: &[u8; ED25519_SEED_SIZE],
    kek: &[u8],
    account_id: &AccountId,
) -> Result<EncryptedPrivateKey, WalletError> {
    let cipher = aead_cipher(kek)?;
    let mut nonce_bytes = [0u8; CHACHA20_NONCE_SIZE];
    getrandom(&mut nonce_bytes)
        .map_err(|e| WalletError::internal(format!("nonce generation failed: {}", e)))?;

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: seed.as_slice(),
                aad: account_id.as_str().as_bytes(),
            },
        )
        .map_err(|_| WalletError::aead_fail("private key encryption failed"))?;

    Ok(EncryptedPrivateKey {
        ciphertext_b64u: base64_url_encode(&ciphertext),
        nonce_b64u: base64_url_encode(&nonce_bytes),
    })
}

/// Decrypt a signing seed. Any tampering with ciphertext, nonce, or account
/// binding fails with `AEAD_FAIL` and nothing else.
pub fn decrypt_private_key(
    blob: &EncryptedPrivateKey,
    kek: &[u8],
    account_id: &AccountId,
) -> Result<Zeroizing<[u8; ED25519_SEED_SIZE]>, WalletError> {
    let cipher = aead_cipher(kek)?;
    let nonce_bytes = base64_url_decode(&blob.nonce_b64u)?;
    if nonce_bytes.len() != CHACHA20_NONCE_SIZE {
        return Err(WalletError::aead_fail(format!(
            "nonce must be {} bytes",
            CHACHA20_NONCE_SIZE
        )));
    }
    let ciphertext = base64_url_decode(&blob.ciphertext_b64u)?;

    let plaintext = Zeroizing::new(
        cipher
            .decrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: ciphertext.as_slice(),
                    aad: account_id.as_str().as_bytes(),
                },
            )
            .map_err(|_| WalletError::aead_fail("private key decryption failed"))?,
    );

    let mut seed = Zeroizing::new([0u8; ED25519_SEED_SIZE]);
    if plaintext.len() != ED25519_SEED_SIZE {
        return Err(WalletError::aead_fail("decrypted seed has wrong length"));
    }
    seed.copy_from_slice(&plaintext);
    Ok(seed)
}

/// Expand a 32-byte seed into (signing key, public key bytes).
pub fn ed25519_keypair_from_seed(seed: &[u8; ED25519_SEED_SIZE]) -> (SigningKey, [u8; 32]) {
    let signing_key = SigningKey::from_bytes(seed);
    let public_key = signing_key.verifying_key().to_bytes();
    (signing_key, public_key)
}

/// Derive the deterministic signing seed from the PRF key-salt output.
/// Stable across devices for the same (credential, account) pair, which is
/// what makes passkey-based key recovery and device linking possible.
pub fn derive_signing_seed_from_prf(
    prf_key_salt_b64u: &str,
    account_id: &AccountId,
) -> Result<Zeroizing<[u8; ED25519_SEED_SIZE]>, WalletError> {
    let prf_output = Zeroizing::new(base64_url_decode(prf_key_salt_b64u)?);
    if prf_output.is_empty() {
        return Err(WalletError::new(
            ErrorCode::PrfUnavailable,
            "empty PRF key-salt output",
        ));
    }
    let salt = signing_seed_salt_for_account(account_id.as_str());
    let hk = Hkdf::<Sha256>::new(Some(salt.as_bytes()), &prf_output);
    let mut seed = Zeroizing::new([0u8; ED25519_SEED_SIZE]);
    hk.expand(SIGNING_SEED_HKDF_INFO, seed.as_mut())
        .map_err(|_| WalletError::internal("HKDF expand failed for signing seed"))?;
    Ok(seed)
}

/// Derive the NEAR keypair from the PRF key-salt output, in
/// `ed25519:<base58>` string form (private = seed‖pubkey).
pub fn derive_near_keypair_from_prf(
    prf_key_salt_b64u: &str,
    account_id: &AccountId,
) -> Result<(Zeroizing<String>, String), WalletError> {
    let seed = derive_signing_seed_from_prf(prf_key_salt_b64u, account_id)?;
    let (_signing_key, public_key) = ed25519_keypair_from_seed(&seed);
    let private_b58 = Zeroizing::new(encode_near_secret_key(&seed, &public_key));
    Ok((private_b58, encode_near_public_key(&public_key)))
}

/// Ed25519 signature over `message` with the given seed.
pub fn sign_bytes(seed: &[u8; ED25519_SEED_SIZE], message: &[u8]) -> [u8; 64] {
    SigningKey::from_bytes(seed).sign(message).to_bytes()
}

/// Constant-time equality for equal-length secrets. Unequal lengths return
/// false immediately; length is not secret here.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

fn aead_cipher(kek: &[u8]) -> Result<ChaCha20Poly1305, WalletError> {
    if kek.len() != CHACHA20_KEY_SIZE {
        return Err(WalletError::aead_fail("invalid key size for ChaCha20Poly1305"));
    }
    Ok(ChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(kek)))
}
