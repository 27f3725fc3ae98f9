//! VRF key manager: the state the worker actor owns.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use getrandom::getrandom;
use hkdf::Hkdf;
use log::debug;
use sha2::Sha256;
use vrf_wasm::ecvrf::ECVRFKeyPair;
use zeroize::{Zeroizing, ZeroizeOnDrop};

use passkey_core::clock::SharedClock;
use passkey_core::config::{
    CHACHA20_KEY_SIZE, CHACHA20_NONCE_SIZE, VRF_KEYPAIR_AEAD_HKDF_INFO,
};
use passkey_core::encoders::{base64_url_decode, base64_url_encode};
use passkey_core::errors::{ErrorCode, WalletError, WalletResult};
use passkey_core::shamir3pass::Shamir3Pass;
use passkey_core::vrf::{
    challenge_from_keypair, derive_vrf_keypair_from_prf, generate_vrf_keypair, vrf_keypair_bytes,
    vrf_keypair_from_bytes, vrf_public_key_bytes, VrfChallenge, VrfInputData,
};
use passkey_core::AccountId;

use crate::types::{BootstrapVrfResult, DeterministicVrfResult, EncryptedVrfKeypair, VrfStatus};

/// Default session lifetime: 30 minutes.
pub const VRF_SESSION_TTL_MS: u64 = 30 * 60 * 1000;

/// Keypair wrapper that zeroizes key material when the session is replaced
/// or dropped.
#[derive(ZeroizeOnDrop)]
struct SecureVrfKeyPair {
    keypair: ECVRFKeyPair,
}

struct VrfSession {
    account_id: AccountId,
    keypair: SecureVrfKeyPair,
    opened_at_ms: u64,
    ttl_ms: u64,
}

pub struct VrfKeyManager {
    session: Option<VrfSession>,
    clock: SharedClock,
    shamir: Shamir3Pass,
    session_ttl_ms: u64,
}

impl VrfKeyManager {
    pub fn new(clock: SharedClock, shamir: Shamir3Pass, session_ttl_ms: u64) -> Self {
        VrfKeyManager {
            session: None,
            clock,
            shamir,
            session_ttl_ms,
        }
    }

    pub fn shamir(&self) -> &Shamir3Pass {
        &self.shamir
    }

    /// Decrypt an at-rest VRF keypair with the PRF vrf-salt output and open a
    /// session for `account_id`.
    pub fn unlock(
        &mut self,
        account_id: AccountId,
        encrypted: &EncryptedVrfKeypair,
        prf_vrf_salt_b64u: &str,
    ) -> WalletResult<String> {
        let keypair = decrypt_vrf_keypair(encrypted, prf_vrf_salt_b64u)?;
        let public_key = base64_url_encode(&vrf_public_key_bytes(&keypair)?);
        debug!("VRF keypair unlocked for {}", account_id);
        self.install_session(account_id, keypair);
        Ok(public_key)
    }

    /// Load an already-plaintext keypair (Shamir-assisted unlock path).
    pub fn load_keypair(&mut self, account_id: AccountId, keypair: ECVRFKeyPair) -> WalletResult<String> {
        let public_key = base64_url_encode(&vrf_public_key_bytes(&keypair)?);
        self.install_session(account_id, keypair);
        Ok(public_key)
    }

    /// Generate a random keypair and hold it in memory, for the bootstrap
    /// ceremony where no PRF output exists yet.
    pub fn generate_bootstrap(
        &mut self,
        account_id: AccountId,
        input: Option<VrfInputData>,
    ) -> WalletResult<BootstrapVrfResult> {
        let keypair = generate_vrf_keypair()?;
        let vrf_public_key_b64u = base64_url_encode(&vrf_public_key_bytes(&keypair)?);
        let challenge = match input {
            Some(input) => Some(challenge_from_keypair(&keypair, &input)?),
            None => None,
        };
        self.install_session(account_id, keypair);
        Ok(BootstrapVrfResult {
            vrf_public_key_b64u,
            challenge,
        })
    }

    /// Deterministically derive the account's VRF keypair from the PRF
    /// vrf-salt output, encrypt it for local storage, open a session with it,
    /// and optionally produce a challenge in the same pass.
    pub fn derive_deterministic(
        &mut self,
        account_id: AccountId,
        prf_vrf_salt_b64u: &str,
        input: Option<VrfInputData>,
    ) -> WalletResult<DeterministicVrfResult> {
        let keypair = derive_vrf_keypair_from_prf(prf_vrf_salt_b64u, &account_id)?;
        let vrf_public_key_b64u = base64_url_encode(&vrf_public_key_bytes(&keypair)?);
        let encrypted = encrypt_vrf_keypair(&keypair, prf_vrf_salt_b64u)?;
        let challenge = match input {
            Some(input) => Some(challenge_from_keypair(&keypair, &input)?),
            None => None,
        };
        self.install_session(account_id, keypair);
        Ok(DeterministicVrfResult {
            vrf_public_key_b64u,
            encrypted,
            challenge,
        })
    }

    /// Produce a challenge with the unlocked keypair. `VRF_LOCKED` without a
    /// live session, `VRF_WRONG_USER` if the session belongs to someone else.
    pub fn challenge(&mut self, input: &VrfInputData) -> WalletResult<VrfChallenge> {
        let session = self.active_session()?;
        if session.account_id.as_str() != input.user_id {
            return Err(WalletError::new(
                ErrorCode::VrfWrongUser,
                format!(
                    "session is for {}, challenge requested for {}",
                    session.account_id, input.user_id
                ),
            ));
        }
        challenge_from_keypair(&session.keypair.keypair, input)
    }

    pub fn status(&mut self, account_id: Option<&AccountId>) -> VrfStatus {
        self.expire_if_needed();
        match &self.session {
            Some(session) => {
                let matches = account_id
                    .map(|a| a == &session.account_id)
                    .unwrap_or(true);
                VrfStatus {
                    active: matches,
                    account_id: Some(session.account_id.clone()),
                    session_duration_ms: self
                        .clock
                        .now_ms()
                        .saturating_sub(session.opened_at_ms),
                }
            }
            None => VrfStatus {
                active: false,
                account_id: None,
                session_duration_ms: 0,
            },
        }
    }

    /// Drop the session and zeroize key material.
    pub fn lock(&mut self) {
        if self.session.take().is_some() {
            debug!("VRF session cleared");
        }
    }

    /// Borrow the live keypair for protocol flows that run inside the worker.
    pub fn session_keypair(&mut self) -> WalletResult<&ECVRFKeyPair> {
        let session = self.active_session()?;
        Ok(&session.keypair.keypair)
    }

    pub fn session_account(&self) -> Option<AccountId> {
        self.session.as_ref().map(|s| s.account_id.clone())
    }

    fn install_session(&mut self, account_id: AccountId, keypair: ECVRFKeyPair) {
        // Replacing the session zeroizes the previous keypair on drop.
        self.session = Some(VrfSession {
            account_id,
            keypair: SecureVrfKeyPair { keypair },
            opened_at_ms: self.clock.now_ms(),
            ttl_ms: self.session_ttl_ms,
        });
    }

    fn active_session(&mut self) -> WalletResult<&VrfSession> {
        self.expire_if_needed();
        self.session.as_ref().ok_or_else(|| {
            WalletError::new(ErrorCode::VrfLocked, "no VRF session; unlock first")
        })
    }

    fn expire_if_needed(&mut self) {
        if let Some(session) = &self.session {
            let age = self.clock.now_ms().saturating_sub(session.opened_at_ms);
            if age >= session.ttl_ms {
                debug!(
                    "VRF session for {} expired after {}ms",
                    session.account_id, age
                );
                self.session = None;
            }
        }
    }
}

/// Derive the keypair-at-rest AEAD key from the PRF vrf-salt output.
fn derive_keypair_aead_key(
    prf_vrf_salt_b64u: &str,
) -> WalletResult<Zeroizing<[u8; CHACHA20_KEY_SIZE]>> {
    let prf_output = Zeroizing::new(base64_url_decode(prf_vrf_salt_b64u)?);
    if prf_output.is_empty() {
        return Err(WalletError::new(
            ErrorCode::PrfUnavailable,
            "empty PRF vrf-salt output",
        ));
    }
    let hk = Hkdf::<Sha256>::new(None, &prf_output);
    let mut key = Zeroizing::new([0u8; CHACHA20_KEY_SIZE]);
    hk.expand(VRF_KEYPAIR_AEAD_HKDF_INFO, key.as_mut())
        .map_err(|_| WalletError::internal("HKDF expand failed for VRF keypair key"))?;
    Ok(key)
}

/// Encrypt a VRF keypair for local storage.
pub fn encrypt_vrf_keypair(
    keypair: &ECVRFKeyPair,
    prf_vrf_salt_b64u: &str,
) -> WalletResult<EncryptedVrfKeypair> {
    let key = derive_keypair_aead_key(prf_vrf_salt_b64u)?;
    let cipher = ChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(key.as_ref()));
    let mut nonce = [0u8; CHACHA20_NONCE_SIZE];
    getrandom(&mut nonce)
        .map_err(|e| WalletError::internal(format!("nonce generation failed: {}", e)))?;
    let plaintext = Zeroizing::new(vrf_keypair_bytes(keypair)?);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
        .map_err(|_| WalletError::aead_fail("VRF keypair encryption failed"))?;
    Ok(EncryptedVrfKeypair {
        ciphertext_b64u: base64_url_encode(&ciphertext),
        nonce_b64u: base64_url_encode(&nonce),
    })
}

/// Decrypt an at-rest VRF keypair.
pub fn decrypt_vrf_keypair(
    encrypted: &EncryptedVrfKeypair,
    prf_vrf_salt_b64u: &str,
) -> WalletResult<ECVRFKeyPair> {
    let key = derive_keypair_aead_key(prf_vrf_salt_b64u)?;
    let cipher = ChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(key.as_ref()));
    let nonce = base64_url_decode(&encrypted.nonce_b64u)?;
    if nonce.len() != CHACHA20_NONCE_SIZE {
        return Err(WalletError::aead_fail(format!(
            "nonce must be {} bytes",
            CHACHA20_NONCE_SIZE
        )));
    }
    let ciphertext = base64_url_decode(&encrypted.ciphertext_b64u)?;
    let plaintext = Zeroizing::new(
        cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
            .map_err(|_| WalletError::aead_fail("VRF keypair decryption failed"))?,
    );
    vrf_keypair_from_bytes(&plaintext)
}
