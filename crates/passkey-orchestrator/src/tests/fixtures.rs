//! In-memory chain, credential provider, and wiring for orchestrator tests.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use passkey_chain_client::outcome::TxExecutionOutcome;
use passkey_chain_client::views::{
    AccessKeyList, AccessKeyView, AccountView, BlockInfo, CallFunctionResult,
};
use passkey_chain_client::{ChainRpc, Finality, NonceManager, TxWaitUntil};
use passkey_core::clock::{ManualClock, SharedClock};
use passkey_core::encoders::{base64_standard_decode, base64_url_encode};
use passkey_core::errors::{ErrorCode, WalletError, WalletResult};
use passkey_core::near::{AccessKeyPermission, SignedTransaction};
use passkey_core::store::MemoryStore;
use passkey_core::webauthn::{
    AssertionCeremony, PrfOutputs, RegistrationCeremony, WebAuthnAuthenticationCredential,
    WebAuthnAuthenticationResponse, WebAuthnRegistrationCredential, WebAuthnRegistrationResponse,
};
use passkey_core::AccountId;
use passkey_signer_worker::{SignerWorkerConfig, SignerWorkerHandle};
use passkey_vrf_worker::{VrfWorkerConfig, VrfWorkerHandle};

use crate::credentials::{
    CreateCredentialRequest, CredentialProvider, GetAssertionRequest, HostInfo,
};
use crate::orchestrator::TransactionOrchestrator;

pub const RP_ID: &str = "wallet.example.com";

pub fn account() -> AccountId {
    AccountId::new("alice.test").unwrap()
}

pub fn contract() -> AccountId {
    AccountId::new("webauthn.test").unwrap()
}

// === CHAIN MOCK ===

/// One broadcast as seen by the mock chain.
#[derive(Clone, Debug)]
pub struct SentTransaction {
    pub signer_id: String,
    pub receiver_id: String,
    pub nonce: u64,
    pub action_count: usize,
    pub public_key: [u8; 32],
    pub block_hash: [u8; 32],
}

#[derive(Default)]
pub struct WalletChain {
    pub height: AtomicU64,
    pub account_nonce: AtomicU64,
    pub verify_ok: AtomicBool,
    pub verify_calls: AtomicUsize,
    pub sent: Mutex<Vec<SentTransaction>>,
    /// `get_device_linking_account` returns null until this many lookups have
    /// happened, then `[account, counter]`.
    pub mapping_after_polls: AtomicUsize,
    pub mapping_counter: AtomicU64,
    pub mapping_account: Mutex<Option<String>>,
    pub poll_count: AtomicUsize,
}

impl WalletChain {
    pub fn new() -> Arc<Self> {
        let chain = WalletChain {
            height: AtomicU64::new(1_000),
            verify_ok: AtomicBool::new(true),
            ..Default::default()
        };
        Arc::new(chain)
    }

    pub fn block_hash_bytes(&self) -> [u8; 32] {
        [7u8; 32]
    }

    pub fn sent(&self) -> Vec<SentTransaction> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainRpc for WalletChain {
    async fn view_account(&self, _account_id: &AccountId) -> WalletResult<AccountView> {
        Ok(AccountView {
            amount: "1000000000000000000000000".to_string(),
            locked: "0".to_string(),
            code_hash: String::new(),
            storage_usage: 100,
            block_height: self.height.load(Ordering::SeqCst),
            block_hash: bs58::encode(self.block_hash_bytes()).into_string(),
        })
    }

    async fn view_access_key(
        &self,
        _account_id: &AccountId,
        _public_key: &str,
    ) -> WalletResult<AccessKeyView> {
        Ok(AccessKeyView {
            nonce: self.account_nonce.load(Ordering::SeqCst),
            permission: AccessKeyPermission::FullAccess,
            block_height: self.height.load(Ordering::SeqCst),
            block_hash: String::new(),
        })
    }

    async fn view_access_key_list(&self, _account_id: &AccountId) -> WalletResult<AccessKeyList> {
        Ok(AccessKeyList { keys: Vec::new() })
    }

    async fn view_block(&self, _finality: Finality) -> WalletResult<BlockInfo> {
        Ok(BlockInfo {
            height: self.height.load(Ordering::SeqCst),
            hash: bs58::encode(self.block_hash_bytes()).into_string(),
            timestamp: 0,
        })
    }

    async fn call_function(
        &self,
        _contract_id: &AccountId,
        method_name: &str,
        args: &Value,
    ) -> WalletResult<CallFunctionResult> {
        match method_name {
            "verify_authentication_response" => {
                self.verify_calls.fetch_add(1, Ordering::SeqCst);
                let verified = self.verify_ok.load(Ordering::SeqCst);
                Ok(CallFunctionResult::from_raw(
                    json!({ "verified": verified }).to_string().into_bytes(),
                    vec![],
                ))
            }
            "get_device_linking_account" => {
                let polls = self.poll_count.fetch_add(1, Ordering::SeqCst) + 1;
                let ready = polls >= self.mapping_after_polls.load(Ordering::SeqCst);
                let body = match (ready, self.mapping_account.lock().unwrap().clone()) {
                    (true, Some(account)) => {
                        assert!(args.get("device_public_key").is_some());
                        json!([account, self.mapping_counter.load(Ordering::SeqCst)])
                    }
                    _ => Value::Null,
                };
                Ok(CallFunctionResult::from_raw(
                    body.to_string().into_bytes(),
                    vec![],
                ))
            }
            other => Err(WalletError::new(
                ErrorCode::RpcError,
                format!("unmocked contract method {}", other),
            )),
        }
    }

    async fn send_tx(
        &self,
        signed_tx_base64: &str,
        _wait_until: TxWaitUntil,
    ) -> WalletResult<TxExecutionOutcome> {
        let bytes = base64_standard_decode(signed_tx_base64)?;
        let signed = SignedTransaction::from_borsh_bytes(&bytes)?;
        let tx = &signed.transaction;
        let record = SentTransaction {
            signer_id: tx.signer_id.to_string(),
            receiver_id: tx.receiver_id.to_string(),
            nonce: tx.nonce,
            action_count: tx.actions.len(),
            public_key: tx.public_key.key_data,
            block_hash: tx.block_hash.0,
        };
        let hash = passkey_core::near::signed_transaction_hash(&bytes);
        self.sent.lock().unwrap().push(record);
        Ok(serde_json::from_value(json!({
            "status": { "SuccessValue": "" },
            "transaction": { "hash": hash },
            "receipts_outcome": [],
        }))
        .map_err(|e| WalletError::internal(e.to_string()))?)
    }
}

// === CREDENTIAL PROVIDER MOCK ===

pub fn prf_key_salt() -> String {
    base64_url_encode(&[11u8; 32])
}

pub fn prf_vrf_salt() -> String {
    base64_url_encode(&[22u8; 32])
}

fn synthetic_attestation_b64u(credential_id: &str) -> String {
    use ciborium::Value as Cbor;

    let mut auth_data = vec![0u8; 32];
    auth_data.push(0x40); // attested credential data present
    auth_data.extend_from_slice(&[0, 0, 0, 1]);
    auth_data.extend_from_slice(&[0u8; 16]); // AAGUID
    let cred_id = credential_id.as_bytes();
    auth_data.extend_from_slice(&(cred_id.len() as u16).to_be_bytes());
    auth_data.extend_from_slice(cred_id);
    auth_data.extend_from_slice(&[0xa5, 0x01, 0x02, 0x03, 0x26]); // COSE key stub

    let map = Cbor::Map(vec![
        (Cbor::Text("fmt".into()), Cbor::Text("none".into())),
        (Cbor::Text("authData".into()), Cbor::Bytes(auth_data)),
    ]);
    let mut encoded = Vec::new();
    ciborium::into_writer(&map, &mut encoded).unwrap();
    base64_url_encode(&encoded)
}

#[derive(Default)]
pub struct MockCredentials {
    pub create_calls: AtomicUsize,
    pub assert_calls: AtomicUsize,
    pub deny_assertions: AtomicBool,
}

#[async_trait]
impl CredentialProvider for MockCredentials {
    async fn create_credential(
        &self,
        request: CreateCredentialRequest,
    ) -> WalletResult<RegistrationCeremony> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let credential_id = format!("cred-{}", request.account_id);
        let client_data = json!({
            "type": "webauthn.create",
            "challenge": request.challenge_b64u,
            "origin": format!("https://{}", request.rp_id),
        });
        Ok(RegistrationCeremony {
            credential: WebAuthnRegistrationCredential {
                id: credential_id.clone(),
                raw_id: base64_url_encode(credential_id.as_bytes()),
                credential_type: "public-key".to_string(),
                authenticator_attachment: Some("platform".to_string()),
                response: WebAuthnRegistrationResponse {
                    client_data_json: base64_url_encode(client_data.to_string().as_bytes()),
                    attestation_object: synthetic_attestation_b64u(&credential_id),
                    transports: Some(vec!["internal".to_string()]),
                },
            },
            prf_outputs: PrfOutputs {
                key_salt_b64u: prf_key_salt(),
                vrf_salt_b64u: prf_vrf_salt(),
            },
        })
    }

    async fn get_assertion(
        &self,
        request: GetAssertionRequest,
    ) -> WalletResult<AssertionCeremony> {
        self.assert_calls.fetch_add(1, Ordering::SeqCst);
        if self.deny_assertions.load(Ordering::SeqCst) {
            return Err(WalletError::new(
                ErrorCode::CredentialDenied,
                "user dismissed the prompt",
            ));
        }
        let client_data = json!({
            "type": "webauthn.get",
            "challenge": request.challenge_b64u,
            "origin": format!("https://{}", request.rp_id),
        });
        Ok(AssertionCeremony {
            credential: WebAuthnAuthenticationCredential {
                id: format!("cred-{}", request.account_id),
                raw_id: base64_url_encode(format!("cred-{}", request.account_id).as_bytes()),
                credential_type: "public-key".to_string(),
                authenticator_attachment: Some("platform".to_string()),
                response: WebAuthnAuthenticationResponse {
                    client_data_json: base64_url_encode(client_data.to_string().as_bytes()),
                    authenticator_data: base64_url_encode(&[0u8; 37]),
                    signature: base64_url_encode(&[1u8; 64]),
                    user_handle: None,
                },
            },
            prf_outputs: PrfOutputs {
                key_salt_b64u: prf_key_salt(),
                vrf_salt_b64u: prf_vrf_salt(),
            },
        })
    }
}

// === WIRING ===

pub struct TestWallet {
    pub orchestrator: TransactionOrchestrator,
    pub chain: Arc<WalletChain>,
    pub credentials: Arc<MockCredentials>,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
}

pub fn test_wallet() -> TestWallet {
    let chain = WalletChain::new();
    let credentials = Arc::new(MockCredentials::default());
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(1_000_000));
    let shared_clock: SharedClock = clock.clone();

    let vrf = VrfWorkerHandle::spawn(VrfWorkerConfig::new(shared_clock.clone()));
    let signer = SignerWorkerHandle::spawn(SignerWorkerConfig {
        store: store.clone(),
        rpc: chain.clone(),
        clock: shared_clock.clone(),
    });
    let nonce = NonceManager::new(chain.clone(), shared_clock.clone());

    let orchestrator = TransactionOrchestrator {
        vrf,
        signer,
        credentials: credentials.clone(),
        rpc: chain.clone(),
        nonce,
        store: store.clone(),
        host: HostInfo {
            rp_id: RP_ID.to_string(),
        },
        contract_id: contract(),
        clock: shared_clock,
    };

    TestWallet {
        orchestrator,
        chain,
        credentials,
        store,
        clock,
    }
}
