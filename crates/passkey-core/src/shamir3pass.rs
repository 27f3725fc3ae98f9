//! Shamir 3-pass commutative locking.
//!
//! All locks are modular exponentiations over a shared prime `p`. A party
//! holds an exponent pair `(e, d)` with `e·d ≡ 1 (mod p-1)`, so
//! `m^(e·d) ≡ m (mod p)` and locks from different parties commute. The wallet
//! uses this to co-lock a KEK between client and relay without either side
//! ever seeing the other's exponent.
//!
//! Registration: client locks a fresh KEK → server adds its lock → client
//! removes its own → the server-locked KEK is stored client-side.
//! Login: client re-locks the stored value → server removes its lock →
//! client removes its own → plain KEK, used to decrypt the VRF keypair.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use getrandom::getrandom;
use hkdf::Hkdf;
use num_bigint::{BigInt, BigUint, Sign};
use num_integer::Integer;
use num_traits::{One, Signed, Zero};
use sha2::{Digest, Sha256};

use crate::config::{
    CHACHA20_NONCE_SIZE, DEFAULT_SHAMIR_P_B64U, SHAMIR_AEAD_HKDF_INFO, SHAMIR_MIN_PRIME_BITS,
    SHAMIR_RANDOM_BYTES_OVERHEAD, SHAMIR_REJECTION_SAMPLING_MAX_ATTEMPTS,
};
use crate::encoders::{base64_url_decode, base64_url_encode};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Shamir3PassError {
    #[error("invalid prime: {0}")]
    InvalidPrime(String),
    #[error("prime too small: {bits} bits, minimum {min_bits}")]
    PrimeTooSmall { bits: usize, min_bits: usize },
    #[error("no modular inverse exists")]
    ModularInverseNotFound,
    #[error("random generation failed")]
    RandomGenerationFailed,
    #[error("value out of range for modulus")]
    ValueOutOfRange,
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
}

/// An exponent pair; `add` locks, `remove` unlocks.
#[derive(Clone)]
pub struct LockKeys {
    pub e: BigUint,
    pub d: BigUint,
}

impl std::fmt::Debug for LockKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Exponents are secrets.
        f.debug_struct("LockKeys").finish_non_exhaustive()
    }
}

/// Protocol instance bound to one prime.
#[derive(Clone, Debug)]
pub struct Shamir3Pass {
    p: BigUint,
    p_minus_1: BigUint,
    min_k: BigUint,
    max_k: BigUint,
}

impl Shamir3Pass {
    pub fn new(p_b64u: &str) -> Result<Self, Shamir3PassError> {
        let p = decode_biguint_b64u(p_b64u)
            .map_err(|_| Shamir3PassError::InvalidPrime("invalid base64url".to_string()))?;
        let bits = p.bits() as usize;
        if bits < SHAMIR_MIN_PRIME_BITS {
            return Err(Shamir3PassError::PrimeTooSmall {
                bits,
                min_bits: SHAMIR_MIN_PRIME_BITS,
            });
        }
        Ok(Self::from_prime(p))
    }

    pub fn new_default() -> Self {
        let p = decode_biguint_b64u(DEFAULT_SHAMIR_P_B64U).expect("default prime is valid");
        Self::from_prime(p)
    }

    fn from_prime(p: BigUint) -> Self {
        let one = BigUint::one();
        let p_minus_1 = &p - &one;
        let max_k = &p_minus_1 - &one;
        // Lower bound on random exponents; scaled down for short test primes.
        let min_k = if p.bits() >= 1024 {
            BigUint::from(1u128 << 64)
        } else {
            BigUint::from(1u64 << 32)
        };
        Shamir3Pass {
            p,
            p_minus_1,
            min_k,
            max_k,
        }
    }

    pub fn p(&self) -> &BigUint {
        &self.p
    }

    pub fn p_b64u(&self) -> String {
        encode_biguint_b64u(&self.p)
    }

    pub fn p_minus_1(&self) -> &BigUint {
        &self.p_minus_1
    }

    /// `base^exp mod p`.
    pub fn modexp(&self, base: &BigUint, exp: &BigUint) -> BigUint {
        base.modpow(exp, &self.p)
    }

    /// Inverse of `a` modulo `p-1`, if `gcd(a, p-1) = 1`.
    pub fn modinv(&self, a: &BigUint) -> Option<BigUint> {
        let a = BigInt::from_biguint(Sign::Plus, a.clone());
        let m = BigInt::from_biguint(Sign::Plus, self.p_minus_1.clone());
        let ext = a.extended_gcd(&m);
        if ext.gcd != BigInt::one() {
            return None;
        }
        let mut x = ext.x % &m;
        if x.is_negative() {
            x += &m;
        }
        x.to_biguint()
    }

    /// Random exponent in `[min_k, p-2]` with `gcd(k, p-1) = 1`, by
    /// rejection sampling.
    pub fn random_k(&self) -> Result<BigUint, Shamir3PassError> {
        let range = &self.max_k - &self.min_k;
        let bytes_needed = ((range.bits() as usize + 7) / 8) + SHAMIR_RANDOM_BYTES_OVERHEAD;

        for _ in 0..SHAMIR_REJECTION_SAMPLING_MAX_ATTEMPTS {
            let mut buf = vec![0u8; bytes_needed];
            getrandom(&mut buf).map_err(|_| Shamir3PassError::RandomGenerationFailed)?;
            let k = &self.min_k + BigUint::from_bytes_be(&buf) % &range;
            if k.gcd(&self.p_minus_1) == BigUint::one() {
                return Ok(k);
            }
        }
        Err(Shamir3PassError::RandomGenerationFailed)
    }

    /// Fresh `(e, d)` with `e·d ≡ 1 (mod p-1)`.
    pub fn generate_lock_keys(&self) -> Result<LockKeys, Shamir3PassError> {
        let e = self.random_k()?;
        let d = self
            .modinv(&e)
            .ok_or(Shamir3PassError::ModularInverseNotFound)?;
        Ok(LockKeys { e, d })
    }

    /// Apply a lock. Rejects values outside `[1, p)` so a malformed peer
    /// value cannot silently alias modulo p.
    pub fn add_lock(&self, value: &BigUint, exponent: &BigUint) -> Result<BigUint, Shamir3PassError> {
        if value.is_zero() || value >= &self.p {
            return Err(Shamir3PassError::ValueOutOfRange);
        }
        Ok(self.modexp(value, exponent))
    }

    /// Remove a lock; same exponentiation, the inverse exponent undoes it.
    pub fn remove_lock(
        &self,
        value: &BigUint,
        exponent: &BigUint,
    ) -> Result<BigUint, Shamir3PassError> {
        self.add_lock(value, exponent)
    }

    /// Draw a fresh random KEK usable as a lockable value.
    pub fn random_kek(&self) -> Result<BigUint, Shamir3PassError> {
        self.random_k()
    }

    // === KEK ⇄ AEAD BRIDGE ===
    // The locked integer protects a symmetric key; actual payload encryption
    // is ChaCha20Poly1305 under an HKDF of the KEK bytes.

    fn derive_aead_key(&self, kek: &BigUint) -> Result<[u8; 32], Shamir3PassError> {
        let kek_bytes = kek.to_bytes_be();
        let hk = Hkdf::<Sha256>::new(None, &kek_bytes);
        let mut key = [0u8; 32];
        hk.expand(SHAMIR_AEAD_HKDF_INFO, &mut key)
            .map_err(|_| Shamir3PassError::EncryptionFailed("HKDF expand failed".to_string()))?;
        Ok(key)
    }

    /// Encrypt `plaintext` under the KEK; nonce is prepended to the result.
    pub fn encrypt_with_kek(
        &self,
        kek: &BigUint,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, Shamir3PassError> {
        let key = self.derive_aead_key(kek)?;
        let cipher = ChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(&key));
        let mut nonce = [0u8; CHACHA20_NONCE_SIZE];
        getrandom(&mut nonce).map_err(|_| Shamir3PassError::RandomGenerationFailed)?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| Shamir3PassError::EncryptionFailed(e.to_string()))?;
        let mut out = nonce.to_vec();
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypt a nonce-prefixed ciphertext under the KEK.
    pub fn decrypt_with_kek(
        &self,
        kek: &BigUint,
        data: &[u8],
    ) -> Result<Vec<u8>, Shamir3PassError> {
        if data.len() < CHACHA20_NONCE_SIZE {
            return Err(Shamir3PassError::DecryptionFailed(
                "ciphertext too short".to_string(),
            ));
        }
        let (nonce, ciphertext) = data.split_at(CHACHA20_NONCE_SIZE);
        let key = self.derive_aead_key(kek)?;
        let cipher = ChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(&key));
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| Shamir3PassError::DecryptionFailed(e.to_string()))
    }
}

/// Stable identifier of a server keypair: base64url of sha256 over the
/// big-endian bytes of its lock exponent.
pub fn key_id_for_exponent(e: &BigUint) -> String {
    let digest = Sha256::digest(e.to_bytes_be());
    base64_url_encode(&digest)
}

pub fn encode_biguint_b64u(value: &BigUint) -> String {
    base64_url_encode(&value.to_bytes_be())
}

pub fn decode_biguint_b64u(value: &str) -> Result<BigUint, crate::errors::WalletError> {
    Ok(BigUint::from_bytes_be(&base64_url_decode(value)?))
}
