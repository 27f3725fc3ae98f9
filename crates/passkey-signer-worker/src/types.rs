//! Request and result payloads for the signer worker.

use serde::{Deserialize, Serialize};

use passkey_core::actions::ActionParams;
use passkey_core::crypto::EncryptedPrivateKey;
use passkey_core::near::SignedTransactionEnvelope;
use passkey_core::vrf::{VrfChallenge, VrfData};
use passkey_core::webauthn::{WebAuthnAuthenticationCredential, WebAuthnRegistrationCredential};
use passkey_core::AccountId;

/// One transaction within a signing batch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransactionSigningRequest {
    pub receiver_id: AccountId,
    pub actions: Vec<ActionParams>,
}

/// Passkey-path signing request. `base_nonce` seeds the batch; transaction
/// `i` is signed with `base_nonce + i` and all share `block_hash`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignTransactionsRequest {
    pub account_id: AccountId,
    pub transactions: Vec<TransactionSigningRequest>,
    pub base_nonce: u64,
    /// base58 block hash from the signing context.
    pub block_hash: String,
    pub vrf_challenge: VrfChallenge,
    pub credential: WebAuthnAuthenticationCredential,
    /// PRF key-salt output surfaced by the assertion ceremony.
    pub prf_key_salt_b64u: String,
    /// WebAuthn registry contract that verifies the assertion.
    pub contract_id: AccountId,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignTransactionsResult {
    pub signed_transactions: Vec<SignedTransactionEnvelope>,
    pub logs: Vec<String>,
}

/// Raw-keypair signing request (device-linking key replacement).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignWithKeypairRequest {
    /// `ed25519:<base58 64 bytes>` private key.
    pub private_key: String,
    pub signer_id: AccountId,
    pub receiver_id: AccountId,
    pub nonce: u64,
    pub block_hash: String,
    pub actions: Vec<ActionParams>,
}

/// Device-link registration call to sign with a freshly derived key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LinkRegistrationTx {
    pub contract_id: AccountId,
    pub vrf_data: VrfData,
    pub deterministic_vrf_public_key: Vec<u8>,
    pub webauthn_registration: WebAuthnRegistrationCredential,
    /// Contract-defined options, passed through verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticator_options: Option<serde_json::Value>,
    pub nonce: u64,
    pub block_hash: String,
}

/// Derive the deterministic signing key for an account from a PRF output,
/// encrypt it at rest, and optionally sign the registration transaction with
/// it in the same pass.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeriveKeypairRequest {
    pub account_id: AccountId,
    pub prf_key_salt_b64u: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_tx: Option<LinkRegistrationTx>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeriveKeypairResult {
    pub public_key: String,
    pub encrypted: EncryptedPrivateKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_registration_tx: Option<SignedTransactionEnvelope>,
}

/// NEP-413 message signing request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignNep413Request {
    pub account_id: AccountId,
    pub prf_key_salt_b64u: String,
    pub message: String,
    pub recipient: String,
    /// base64url 32-byte nonce.
    pub nonce_b64u: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignNep413Result {
    pub account_id: AccountId,
    pub public_key: String,
    /// Standard base64 Ed25519 signature over the NEP-413 digest.
    pub signature_b64: String,
}

/// Export the decrypted private key (explicit user action only).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DecryptPrivateKeyRequest {
    pub account_id: AccountId,
    pub prf_key_salt_b64u: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DecryptPrivateKeyResult {
    pub private_key: String,
    pub public_key: String,
}
