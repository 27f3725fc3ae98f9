//! VRF challenge construction over ECVRF.
//!
//! The VRF input binds a user, a relying party, and a recent block:
//! `sha256(domain ‖ user_id ‖ rp_id ‖ block_height_le ‖ block_hash)`.
//! The output becomes the WebAuthn challenge; the proof is posted on chain so
//! the registry contract can verify the binding independently.

use rand_core::SeedableRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use vrf_wasm::ecvrf::{ECVRFKeyPair, ECVRFProof, ECVRFPublicKey};
use vrf_wasm::traits::WasmRngFromSeed;
use vrf_wasm::vrf::{VRFKeyPair, VRFProof};
use zeroize::Zeroizing;

use crate::account::AccountId;
use crate::config::{VRF_DOMAIN_SEPARATOR, VRF_SEED_HKDF_INFO, VRF_SEED_SIZE};
use crate::crypto::constant_time_eq;
use crate::encoders::{base64_url_decode, base64_url_encode};
use crate::errors::{ErrorCode, WalletError};

/// Parameters a challenge is built from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VrfInputData {
    pub user_id: String,
    pub rp_id: String,
    pub block_height: u64,
    /// 32-byte block hash.
    pub block_hash: Vec<u8>,
}

/// A fresh VRF challenge, valid for the block it binds. All binary fields are
/// base64url.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VrfChallenge {
    pub user_id: String,
    pub rp_id: String,
    pub block_height: u64,
    pub block_hash_b64u: String,
    pub vrf_input_b64u: String,
    pub vrf_output_b64u: String,
    pub vrf_proof_b64u: String,
    pub vrf_public_key_b64u: String,
}

impl VrfChallenge {
    /// The authenticator challenge is the VRF output.
    pub fn webauthn_challenge_b64u(&self) -> &str {
        &self.vrf_output_b64u
    }
}

/// Decoded byte form of a challenge, shaped for registry-contract arguments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VrfData {
    pub vrf_input_data: Vec<u8>,
    pub vrf_output: Vec<u8>,
    pub vrf_proof: Vec<u8>,
    pub public_key: Vec<u8>,
    pub user_id: String,
    pub rp_id: String,
    pub block_height: u64,
    pub block_hash: Vec<u8>,
}

impl TryFrom<&VrfChallenge> for VrfData {
    type Error = WalletError;

    fn try_from(challenge: &VrfChallenge) -> Result<Self, Self::Error> {
        Ok(VrfData {
            vrf_input_data: base64_url_decode(&challenge.vrf_input_b64u)?,
            vrf_output: base64_url_decode(&challenge.vrf_output_b64u)?,
            vrf_proof: base64_url_decode(&challenge.vrf_proof_b64u)?,
            public_key: base64_url_decode(&challenge.vrf_public_key_b64u)?,
            user_id: challenge.user_id.clone(),
            rp_id: challenge.rp_id.clone(),
            block_height: challenge.block_height,
            block_hash: base64_url_decode(&challenge.block_hash_b64u)?,
        })
    }
}

/// Hash the domain-separated challenge input.
pub fn build_vrf_input(input: &VrfInputData) -> Vec<u8> {
    let mut data = Vec::with_capacity(
        VRF_DOMAIN_SEPARATOR.len()
            + input.user_id.len()
            + input.rp_id.len()
            + 8
            + input.block_hash.len(),
    );
    data.extend_from_slice(VRF_DOMAIN_SEPARATOR);
    data.extend_from_slice(input.user_id.as_bytes());
    data.extend_from_slice(input.rp_id.as_bytes());
    data.extend_from_slice(&input.block_height.to_le_bytes());
    data.extend_from_slice(&input.block_hash);
    Sha256::digest(&data).to_vec()
}

/// Generate a VRF keypair from system randomness (bootstrap before the first
/// PRF ceremony exists).
pub fn generate_vrf_keypair() -> Result<ECVRFKeyPair, WalletError> {
    let mut seed = Zeroizing::new([0u8; VRF_SEED_SIZE]);
    getrandom::getrandom(seed.as_mut())
        .map_err(|e| WalletError::internal(format!("VRF seed generation failed: {}", e)))?;
    Ok(keypair_from_seed(&seed))
}

/// Deterministic VRF keypair from the PRF vrf-salt output. Identical across
/// devices given the same credential and account.
pub fn derive_vrf_keypair_from_prf(
    prf_vrf_salt_b64u: &str,
    account_id: &AccountId,
) -> Result<ECVRFKeyPair, WalletError> {
    let prf_output = Zeroizing::new(base64_url_decode(prf_vrf_salt_b64u)?);
    if prf_output.is_empty() {
        return Err(WalletError::new(
            ErrorCode::PrfUnavailable,
            "empty PRF vrf-salt output",
        ));
    }
    let hk = hkdf::Hkdf::<Sha256>::new(Some(account_id.as_str().as_bytes()), &prf_output);
    let mut seed = Zeroizing::new([0u8; VRF_SEED_SIZE]);
    hk.expand(VRF_SEED_HKDF_INFO, seed.as_mut())
        .map_err(|_| WalletError::internal("HKDF expand failed for VRF seed"))?;
    Ok(keypair_from_seed(&seed))
}

fn keypair_from_seed(seed: &[u8; VRF_SEED_SIZE]) -> ECVRFKeyPair {
    let mut rng = WasmRngFromSeed::from_seed(*seed);
    ECVRFKeyPair::generate(&mut rng)
}

/// Serialize a VRF public key (bincode, the storage/wire form).
pub fn vrf_public_key_bytes(keypair: &ECVRFKeyPair) -> Result<Vec<u8>, WalletError> {
    bincode::serialize(&keypair.pk)
        .map_err(|e| WalletError::internal(format!("VRF public key serialize failed: {}", e)))
}

/// Serialize a whole VRF keypair (bincode) for encryption at rest.
pub fn vrf_keypair_bytes(keypair: &ECVRFKeyPair) -> Result<Vec<u8>, WalletError> {
    bincode::serialize(keypair)
        .map_err(|e| WalletError::internal(format!("VRF keypair serialize failed: {}", e)))
}

/// Restore a VRF keypair from its bincode form.
pub fn vrf_keypair_from_bytes(bytes: &[u8]) -> Result<ECVRFKeyPair, WalletError> {
    bincode::deserialize(bytes)
        .map_err(|e| WalletError::internal(format!("VRF keypair deserialize failed: {}", e)))
}

/// Produce `(output, proof_bytes)` for a hashed input.
pub fn vrf_prove(
    keypair: &ECVRFKeyPair,
    vrf_input: &[u8],
) -> Result<(Vec<u8>, Vec<u8>), WalletError> {
    let proof = keypair.prove(vrf_input);
    let output = proof.to_hash().to_vec();
    let proof_bytes = bincode::serialize(&proof)
        .map_err(|e| WalletError::internal(format!("VRF proof serialize failed: {}", e)))?;
    Ok((output, proof_bytes))
}

/// Verify an `(input, output, proof)` triple against a serialized public key.
/// Any decode failure or mismatch verifies false; no partial information.
pub fn vrf_verify(
    public_key_bytes: &[u8],
    vrf_input: &[u8],
    vrf_output: &[u8],
    proof_bytes: &[u8],
) -> bool {
    let Ok(public_key) = bincode::deserialize::<ECVRFPublicKey>(public_key_bytes) else {
        return false;
    };
    let Ok(proof) = bincode::deserialize::<ECVRFProof>(proof_bytes) else {
        return false;
    };
    if proof.verify(vrf_input, &public_key).is_err() {
        return false;
    }
    constant_time_eq(&proof.to_hash(), vrf_output)
}

/// Build the full challenge for a keypair and input parameters.
pub fn challenge_from_keypair(
    keypair: &ECVRFKeyPair,
    input: &VrfInputData,
) -> Result<VrfChallenge, WalletError> {
    if input.block_hash.len() != 32 {
        return Err(WalletError::input_invalid("block hash must be 32 bytes"));
    }
    let vrf_input = build_vrf_input(input);
    let (vrf_output, vrf_proof) = vrf_prove(keypair, &vrf_input)?;
    Ok(VrfChallenge {
        user_id: input.user_id.clone(),
        rp_id: input.rp_id.clone(),
        block_height: input.block_height,
        block_hash_b64u: base64_url_encode(&input.block_hash),
        vrf_input_b64u: base64_url_encode(&vrf_input),
        vrf_output_b64u: base64_url_encode(&vrf_output),
        vrf_proof_b64u: base64_url_encode(&vrf_proof),
        vrf_public_key_b64u: base64_url_encode(&vrf_public_key_bytes(keypair)?),
    })
}
