use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use passkey_chain_client::outcome::TxExecutionOutcome;
use passkey_chain_client::views::{
    AccessKeyList, AccessKeyView, AccountView, BlockInfo, CallFunctionResult,
};
use passkey_chain_client::{ChainRpc, Finality, TxWaitUntil};
use passkey_core::actions::ActionParams;
use passkey_core::clock::{ManualClock, SharedClock};
use passkey_core::encoders::{base64_url_encode, decode_near_public_key};
use passkey_core::errors::{ErrorCode, WalletError, WalletResult};
use passkey_core::events::{progress_channel, ActionPhase};
use passkey_core::store::MemoryStore;
use passkey_core::vrf::{challenge_from_keypair, derive_vrf_keypair_from_prf, VrfInputData};
use passkey_core::webauthn::{WebAuthnAuthenticationCredential, WebAuthnAuthenticationResponse};
use passkey_core::AccountId;

use crate::nep413::Nep413Payload;
use crate::signing::{sign_batch, signing_key_from_near_private_key};
use crate::types::{
    DecryptPrivateKeyRequest, DeriveKeypairRequest, SignNep413Request, SignTransactionsRequest,
    SignWithKeypairRequest, TransactionSigningRequest,
};
use crate::worker::{SignerWorkerConfig, SignerWorkerHandle};

// === FIXTURES ===

struct VerifyingRpc {
    pub verify_calls: AtomicUsize,
    pub verified: AtomicBool,
}

impl VerifyingRpc {
    fn new(verified: bool) -> Self {
        VerifyingRpc {
            verify_calls: AtomicUsize::new(0),
            verified: AtomicBool::new(verified),
        }
    }
}

#[async_trait]
impl ChainRpc for VerifyingRpc {
    async fn view_account(&self, _account_id: &AccountId) -> WalletResult<AccountView> {
        Err(WalletError::new(ErrorCode::RpcError, "not mocked"))
    }

    async fn view_access_key(
        &self,
        _account_id: &AccountId,
        _public_key: &str,
    ) -> WalletResult<AccessKeyView> {
        Err(WalletError::new(ErrorCode::RpcError, "not mocked"))
    }

    async fn view_access_key_list(&self, _account_id: &AccountId) -> WalletResult<AccessKeyList> {
        Err(WalletError::new(ErrorCode::RpcError, "not mocked"))
    }

    async fn view_block(&self, _finality: Finality) -> WalletResult<BlockInfo> {
        Err(WalletError::new(ErrorCode::RpcError, "not mocked"))
    }

    async fn call_function(
        &self,
        _contract_id: &AccountId,
        method_name: &str,
        _args: &Value,
    ) -> WalletResult<CallFunctionResult> {
        assert_eq!(method_name, "verify_authentication_response");
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        let verified = self.verified.load(Ordering::SeqCst);
        let body = json!({ "verified": verified }).to_string();
        Ok(CallFunctionResult::from_raw(body.into_bytes(), vec![]))
    }

    async fn send_tx(
        &self,
        _signed_tx_base64: &str,
        _wait_until: TxWaitUntil,
    ) -> WalletResult<TxExecutionOutcome> {
        Err(WalletError::new(ErrorCode::RpcError, "not mocked"))
    }
}

fn account() -> AccountId {
    AccountId::new("alice.test").unwrap()
}

fn contract() -> AccountId {
    AccountId::new("webauthn.test").unwrap()
}

fn prf_key_salt() -> String {
    base64_url_encode(&[11u8; 32])
}

fn prf_vrf_salt() -> String {
    base64_url_encode(&[22u8; 32])
}

fn block_hash_b58() -> String {
    bs58::encode([5u8; 32]).into_string()
}

/// A VRF challenge plus an assertion credential whose clientDataJSON presents
/// the VRF output as its challenge.
fn challenge_and_credential() -> (
    passkey_core::vrf::VrfChallenge,
    WebAuthnAuthenticationCredential,
) {
    let keypair = derive_vrf_keypair_from_prf(&prf_vrf_salt(), &account()).unwrap();
    let challenge = challenge_from_keypair(
        &keypair,
        &VrfInputData {
            user_id: "alice.test".to_string(),
            rp_id: "wallet.example.com".to_string(),
            block_height: 77,
            block_hash: vec![5u8; 32],
        },
    )
    .unwrap();

    let client_data = json!({
        "type": "webauthn.get",
        "challenge": challenge.vrf_output_b64u,
        "origin": "https://wallet.example.com",
    });
    let credential = WebAuthnAuthenticationCredential {
        id: "credential-1".to_string(),
        raw_id: base64_url_encode(b"credential-1"),
        credential_type: "public-key".to_string(),
        authenticator_attachment: Some("platform".to_string()),
        response: WebAuthnAuthenticationResponse {
            client_data_json: base64_url_encode(client_data.to_string().as_bytes()),
            authenticator_data: base64_url_encode(&[0u8; 37]),
            signature: base64_url_encode(&[1u8; 64]),
            user_handle: None,
        },
    };
    (challenge, credential)
}

fn transfer_request(receiver: &str) -> TransactionSigningRequest {
    TransactionSigningRequest {
        receiver_id: AccountId::new(receiver).unwrap(),
        actions: vec![ActionParams::Transfer {
            deposit: "1000000000000000000000000".to_string(),
        }],
    }
}

async fn spawn_worker(verified: bool) -> (SignerWorkerHandle, Arc<MemoryStore>, Arc<VerifyingRpc>) {
    let store = Arc::new(MemoryStore::new());
    let rpc = Arc::new(VerifyingRpc::new(verified));
    let clock: SharedClock = Arc::new(ManualClock::new(1_000));
    let handle = SignerWorkerHandle::spawn(SignerWorkerConfig {
        store: store.clone(),
        rpc: rpc.clone(),
        clock,
    });
    (handle, store, rpc)
}

async fn derive_key(handle: &SignerWorkerHandle) -> String {
    handle
        .derive_keypair_and_encrypt(DeriveKeypairRequest {
            account_id: account(),
            prf_key_salt_b64u: prf_key_salt(),
            registration_tx: None,
        })
        .await
        .unwrap()
        .public_key
}

// === BATCH SIGNING ===

#[test]
fn batch_nonces_are_consecutive_with_shared_block_hash() {
    let signing_key = ed25519_dalek::SigningKey::from_bytes(&[9u8; 32]);
    let requests = vec![
        transfer_request("one.test"),
        transfer_request("two.test"),
        transfer_request("three.test"),
    ];
    let signed = sign_batch(&signing_key, &account(), &requests, 42, &block_hash_b58()).unwrap();

    assert_eq!(signed.len(), 3);
    for (i, envelope) in signed.iter().enumerate() {
        let tx = &envelope.signed_transaction.transaction;
        assert_eq!(tx.nonce, 42 + i as u64);
        assert_eq!(tx.block_hash.0, [5u8; 32]);
        assert_eq!(tx.receiver_id, requests[i].receiver_id);
    }
}

#[test]
fn batch_rejects_zero_base_nonce_and_empty_batches() {
    let signing_key = ed25519_dalek::SigningKey::from_bytes(&[9u8; 32]);
    let err = sign_batch(
        &signing_key,
        &account(),
        &[transfer_request("x.test")],
        0,
        &block_hash_b58(),
    )
    .unwrap_err();
    assert_eq!(err.code, ErrorCode::NonceGap);

    assert!(sign_batch(&signing_key, &account(), &[], 1, &block_hash_b58()).is_err());
}

// === PASSKEY SIGNING PATH ===

#[tokio::test]
async fn passkey_path_signs_batch_after_on_chain_verification() {
    let (handle, _store, rpc) = spawn_worker(true).await;
    let public_key = derive_key(&handle).await;
    let (challenge, credential) = challenge_and_credential();

    let (progress_tx, mut progress_rx) = progress_channel();
    let result = handle
        .sign_transactions(
            SignTransactionsRequest {
                account_id: account(),
                transactions: vec![
                    transfer_request("one.test"),
                    transfer_request("two.test"),
                    transfer_request("three.test"),
                ],
                base_nonce: 7,
                block_hash: block_hash_b58(),
                vrf_challenge: challenge,
                credential,
                prf_key_salt_b64u: prf_key_salt(),
                contract_id: contract(),
            },
            Some(progress_tx),
        )
        .await
        .unwrap();

    assert_eq!(rpc.verify_calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.signed_transactions.len(), 3);
    for (i, envelope) in result.signed_transactions.iter().enumerate() {
        let tx = &envelope.signed_transaction.transaction;
        assert_eq!(tx.nonce, 7 + i as u64);
        assert_eq!(
            tx.public_key.key_data,
            decode_near_public_key(&public_key).unwrap()
        );
    }

    // Progress phases arrive in non-decreasing order.
    let mut phases = Vec::new();
    while let Ok(event) = progress_rx.try_recv() {
        phases.push(event.phase);
    }
    assert_eq!(
        phases,
        vec![
            ActionPhase::WebauthnAuthentication,
            ActionPhase::AuthenticationComplete,
            ActionPhase::TransactionSigningProgress,
            ActionPhase::TransactionSigningComplete,
        ]
    );
}

#[tokio::test]
async fn contract_rejection_fails_before_key_unlock() {
    let (handle, _store, _rpc) = spawn_worker(false).await;
    derive_key(&handle).await;
    let (challenge, credential) = challenge_and_credential();

    let err = handle
        .sign_transactions(
            SignTransactionsRequest {
                account_id: account(),
                transactions: vec![transfer_request("one.test")],
                base_nonce: 7,
                block_hash: block_hash_b58(),
                vrf_challenge: challenge,
                credential,
                prf_key_salt_b64u: prf_key_salt(),
                contract_id: contract(),
            },
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::VrfVerifyFail);
}

#[tokio::test]
async fn tampered_vrf_output_fails_locally() {
    let (handle, _store, rpc) = spawn_worker(true).await;
    derive_key(&handle).await;
    let (mut challenge, credential) = challenge_and_credential();
    challenge.vrf_output_b64u = base64_url_encode(&[0u8; 64]);

    let err = handle
        .sign_transactions(
            SignTransactionsRequest {
                account_id: account(),
                transactions: vec![transfer_request("one.test")],
                base_nonce: 7,
                block_hash: block_hash_b58(),
                vrf_challenge: challenge,
                credential,
                prf_key_salt_b64u: prf_key_salt(),
                contract_id: contract(),
            },
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::VrfVerifyFail);
    assert_eq!(rpc.verify_calls.load(Ordering::SeqCst), 0, "never reached the contract");
}

#[tokio::test]
async fn assertion_with_foreign_challenge_is_rejected() {
    let (handle, _store, _rpc) = spawn_worker(true).await;
    derive_key(&handle).await;
    let (challenge, mut credential) = challenge_and_credential();
    let foreign = json!({
        "type": "webauthn.get",
        "challenge": base64_url_encode(b"someone elses challenge"),
    });
    credential.response.client_data_json = base64_url_encode(foreign.to_string().as_bytes());

    let err = handle
        .sign_transactions(
            SignTransactionsRequest {
                account_id: account(),
                transactions: vec![transfer_request("one.test")],
                base_nonce: 7,
                block_hash: block_hash_b58(),
                vrf_challenge: challenge,
                credential,
                prf_key_salt_b64u: prf_key_salt(),
                contract_id: contract(),
            },
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::AssertionInvalid);
}

#[tokio::test]
async fn wrong_prf_output_cannot_unlock_the_key() {
    let (handle, _store, _rpc) = spawn_worker(true).await;
    derive_key(&handle).await;
    let (challenge, credential) = challenge_and_credential();

    let err = handle
        .sign_transactions(
            SignTransactionsRequest {
                account_id: account(),
                transactions: vec![transfer_request("one.test")],
                base_nonce: 7,
                block_hash: block_hash_b58(),
                vrf_challenge: challenge,
                credential,
                prf_key_salt_b64u: base64_url_encode(&[99u8; 32]),
                contract_id: contract(),
            },
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::AeadFail);
}

// === KEYPAIR PATH AND EXPORT ===

#[tokio::test]
async fn keypair_path_signs_without_credentials() {
    let (handle, _store, _rpc) = spawn_worker(true).await;
    derive_key(&handle).await;

    let exported = handle
        .decrypt_private_key(DecryptPrivateKeyRequest {
            account_id: account(),
            prf_key_salt_b64u: prf_key_salt(),
        })
        .await
        .unwrap();
    assert!(exported.private_key.starts_with("ed25519:"));

    let envelope = handle
        .sign_with_keypair(SignWithKeypairRequest {
            private_key: exported.private_key.clone(),
            signer_id: account(),
            receiver_id: AccountId::new("bob.test").unwrap(),
            nonce: 9,
            block_hash: block_hash_b58(),
            actions: vec![ActionParams::Transfer {
                deposit: "1".to_string(),
            }],
        })
        .await
        .unwrap();
    assert_eq!(envelope.signed_transaction.transaction.nonce, 9);

    // The exported key round-trips into the same signing key.
    let signing_key = signing_key_from_near_private_key(&exported.private_key).unwrap();
    assert_eq!(
        passkey_core::encoders::encode_near_public_key(&signing_key.verifying_key().to_bytes()),
        exported.public_key
    );
}

#[tokio::test]
async fn nep413_signature_verifies_over_the_payload_digest() {
    use ed25519_dalek::Verifier;

    let (handle, _store, _rpc) = spawn_worker(true).await;
    derive_key(&handle).await;

    let nonce_b64u = base64_url_encode(&[8u8; 32]);
    let result = handle
        .sign_nep413_message(SignNep413Request {
            account_id: account(),
            prf_key_salt_b64u: prf_key_salt(),
            message: "log me in".to_string(),
            recipient: "app.example.com".to_string(),
            nonce_b64u: nonce_b64u.clone(),
            callback_url: None,
        })
        .await
        .unwrap();

    let payload = Nep413Payload::new(
        "log me in".to_string(),
        "app.example.com".to_string(),
        &nonce_b64u,
        None,
    )
    .unwrap();
    let digest = payload.signing_digest().unwrap();

    let public_bytes = decode_near_public_key(&result.public_key).unwrap();
    let verifying = ed25519_dalek::VerifyingKey::from_bytes(&public_bytes).unwrap();
    let signature_bytes: [u8; 64] =
        passkey_core::encoders::base64_standard_decode(&result.signature_b64)
            .unwrap()
            .try_into()
            .unwrap();
    let signature = ed25519_dalek::Signature::from_bytes(&signature_bytes);
    assert!(verifying.verify(&digest, &signature).is_ok());

    // A 16-byte nonce is rejected outright.
    let err = handle
        .sign_nep413_message(SignNep413Request {
            account_id: account(),
            prf_key_salt_b64u: prf_key_salt(),
            message: "log me in".to_string(),
            recipient: "app.example.com".to_string(),
            nonce_b64u: base64_url_encode(&[8u8; 16]),
            callback_url: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InputInvalid);
}
