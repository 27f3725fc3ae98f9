//! Two-device key introduction.
//!
//! Device-2 (the new device) renders a QR code carrying a public key; Device-1
//! (the existing device) scans it and, with a single assertion, signs three
//! transactions: AddKey for the presented key, the contract call that stores
//! the linking mapping, and a pre-signed DeleteKey kept for timeout-driven
//! cleanup. Device-2 polls the contract until the mapping appears, swaps its
//! temporary key for the deterministic one, signs the on-chain registration
//! with the new key, and wipes the temporary key.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use zeroize::Zeroize;

use passkey_chain_client::Finality;
use passkey_core::actions::ActionParams;
use passkey_core::config::{contract_methods, DEFAULT_FUNCTION_CALL_GAS};
use passkey_core::cose::extract_credential_public_key;
use passkey_core::crypto::ed25519_keypair_from_seed;
use passkey_core::encoders::{
    base64_url_decode, base64_url_encode, encode_near_public_key, encode_near_secret_key,
};
use passkey_core::errors::{ErrorCode, WalletError, WalletResult};
use passkey_core::near::{AccessKey, SignedTransactionEnvelope};
use passkey_core::store::{
    self, authenticator_key, AuthenticatorRecord, EncryptedVrfKeyRecord, UserRecord,
};
use passkey_core::vrf::{VrfData, VrfInputData};
use passkey_core::webauthn::RegistrationCeremony;
use passkey_core::AccountId;
use passkey_chain_client::TxWaitUntil;
use passkey_signer_worker::{
    DeriveKeypairRequest, SignTransactionsRequest, SignWithKeypairRequest,
    TransactionSigningRequest,
};
use passkey_signer_worker::types::LinkRegistrationTx;

use crate::credentials::{CreateCredentialRequest, GetAssertionRequest};
use crate::orchestrator::TransactionOrchestrator;

// === STATES AND EVENTS ===

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkingState {
    Idle,
    QrGenerated,
    Scanning,
    Authorization,
    Polling,
    AddkeyDetected,
    Registration,
    LinkingComplete,
    AutoLogin,
    Error,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LinkingEvent {
    pub state: LinkingState,
    pub message: String,
}

pub type LinkingEventSender = mpsc::UnboundedSender<LinkingEvent>;

fn emit_linking(events: Option<&LinkingEventSender>, state: LinkingState, message: &str) {
    if let Some(events) = events {
        let _ = events.send(LinkingEvent {
            state,
            message: message.to_string(),
        });
    }
}

// === CONFIG ===

#[derive(Clone, Debug)]
pub struct DeviceLinkingConfig {
    pub poll_interval_ms: u64,
    /// Added to the interval after each miss, up to the max.
    pub poll_backoff_ms: u64,
    pub max_poll_interval_ms: u64,
    pub poll_timeout_ms: u64,
    pub temp_key_ttl_ms: u64,
    pub max_registration_retries: u32,
    pub registration_retry_delay_ms: u64,
}

impl Default for DeviceLinkingConfig {
    fn default() -> Self {
        DeviceLinkingConfig {
            poll_interval_ms: 1_000,
            poll_backoff_ms: 1_000,
            max_poll_interval_ms: 5_000,
            poll_timeout_ms: 120_000,
            temp_key_ttl_ms: 60_000,
            max_registration_retries: 3,
            registration_retry_delay_ms: 1_000,
        }
    }
}

// === EPHEMERAL KEY ===

/// Temporary Ed25519 key with in-place wiping. The seed lives in one shared
/// buffer so the scheduled wipe, explicit cleanup, and success path all clear
/// the same memory.
#[derive(Clone)]
pub struct EphemeralKey {
    seed: Arc<Mutex<[u8; 32]>>,
    public_key: String,
}

impl EphemeralKey {
    pub fn generate() -> WalletResult<Self> {
        let mut seed = [0u8; 32];
        getrandom::getrandom(&mut seed)
            .map_err(|e| WalletError::internal(format!("ephemeral key generation failed: {}", e)))?;
        let (_signing, public) = ed25519_keypair_from_seed(&seed);
        let key = EphemeralKey {
            seed: Arc::new(Mutex::new(seed)),
            public_key: encode_near_public_key(&public),
        };
        Ok(key)
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// NEAR-format private key; fails once the seed has been wiped.
    pub fn private_key(&self) -> WalletResult<String> {
        let seed = self.seed.lock().unwrap();
        if seed.iter().all(|b| *b == 0) {
            return Err(WalletError::new(
                ErrorCode::SessionExpired,
                "temporary key has been wiped",
            ));
        }
        let (_signing, public) = ed25519_keypair_from_seed(&seed);
        Ok(encode_near_secret_key(&seed, &public))
    }

    pub fn wipe(&self) {
        self.seed.lock().unwrap().zeroize();
    }

    pub fn is_wiped(&self) -> bool {
        self.seed.lock().unwrap().iter().all(|b| *b == 0)
    }
}

// === QR PAYLOAD ===

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeviceLinkingQr {
    pub device2_public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<AccountId>,
    pub created_at_ms: u64,
}

impl DeviceLinkingQr {
    pub fn to_payload(&self) -> WalletResult<String> {
        serde_json::to_string(self)
            .map_err(|e| WalletError::internal(format!("qr encode failed: {}", e)))
    }

    pub fn from_payload(payload: &str) -> WalletResult<Self> {
        serde_json::from_str(payload)
            .map_err(|e| WalletError::input_invalid(format!("qr payload invalid: {}", e)))
    }
}

// === DEVICE 2 ===

pub struct Device2RegistrationOutcome {
    pub account_id: AccountId,
    pub device_number: u32,
    pub near_public_key: String,
    pub vrf_public_key_b64u: String,
}

pub struct Device2LinkingFlow<'a> {
    wallet: &'a TransactionOrchestrator,
    config: DeviceLinkingConfig,
    events: Option<LinkingEventSender>,
    temp_key: Option<EphemeralKey>,
    wipe_task: Option<JoinHandle<()>>,
    /// Ceremony captured at QR time when the account was already known.
    qr_ceremony: Option<RegistrationCeremony>,
}

impl<'a> Device2LinkingFlow<'a> {
    pub fn new(
        wallet: &'a TransactionOrchestrator,
        config: DeviceLinkingConfig,
        events: Option<LinkingEventSender>,
    ) -> Self {
        Device2LinkingFlow {
            wallet,
            config,
            events,
            temp_key: None,
            wipe_task: None,
            qr_ceremony: None,
        }
    }

    pub fn temp_key(&self) -> Option<&EphemeralKey> {
        self.temp_key.as_ref()
    }

    /// Generate the QR payload. With a known account a real credential
    /// ceremony runs now and the deterministic key goes into the QR; without
    /// one a temporary key stands in until the account is discovered.
    pub async fn generate_qr(
        &mut self,
        account_id: Option<AccountId>,
    ) -> WalletResult<DeviceLinkingQr> {
        let qr = match account_id {
            None => {
                let key = EphemeralKey::generate()?;
                self.schedule_wipe(&key);
                let qr = DeviceLinkingQr {
                    device2_public_key: key.public_key().to_string(),
                    account_id: None,
                    created_at_ms: self.wallet.clock.now_ms(),
                };
                self.temp_key = Some(key);
                qr
            }
            Some(account_id) => {
                let (ceremony, public_key) = self.run_credential_ceremony(&account_id, None).await?;
                self.qr_ceremony = Some(ceremony);
                DeviceLinkingQr {
                    device2_public_key: public_key,
                    account_id: Some(account_id),
                    created_at_ms: self.wallet.clock.now_ms(),
                }
            }
        };
        emit_linking(self.events.as_ref(), LinkingState::QrGenerated, "QR payload ready");
        Ok(qr)
    }

    /// Poll the contract until Device-1's mapping lands. Returns the linked
    /// account and this device's contract-assigned ordinal (`counter + 1`).
    pub async fn poll_for_authorization(
        &mut self,
        device_public_key: &str,
    ) -> WalletResult<(AccountId, u32)> {
        emit_linking(
            self.events.as_ref(),
            LinkingState::Polling,
            "waiting for authorization from the existing device",
        );

        let mut interval = self.config.poll_interval_ms;
        let mut waited = 0u64;
        loop {
            let lookup = self
                .wallet
                .rpc
                .call_function(
                    &self.wallet.contract_id,
                    contract_methods::GET_DEVICE_LINKING_ACCOUNT,
                    &json!({ "device_public_key": device_public_key }),
                )
                .await;

            if let Ok(result) = lookup {
                if let Some(mapping) = result.value.as_array() {
                    if mapping.len() == 2 {
                        let account_id: AccountId = mapping[0]
                            .as_str()
                            .unwrap_or_default()
                            .parse()
                            .map_err(|e: WalletError| {
                                WalletError::internal(format!("bad mapping account: {}", e.message))
                            })?;
                        let counter = mapping[1].as_u64().unwrap_or(0) as u32;
                        let device_number = counter + 1;
                        emit_linking(
                            self.events.as_ref(),
                            LinkingState::AddkeyDetected,
                            &format!("linked to {} as device {}", account_id, device_number),
                        );
                        return Ok((account_id, device_number));
                    }
                }
                // Null result: the mapping is not stored yet.
            }

            if waited >= self.config.poll_timeout_ms {
                self.cleanup();
                return Err(WalletError::new(
                    ErrorCode::AuthorizationTimeout,
                    "authorization did not arrive in time",
                ));
            }
            tokio::time::sleep(Duration::from_millis(interval)).await;
            waited = waited.saturating_add(interval);
            interval = (interval + self.config.poll_backoff_ms).min(self.config.max_poll_interval_ms);
        }
    }

    /// After ADDKEY_DETECTED: swap the temporary key for the deterministic
    /// one (when a temporary key exists), register on-chain with the new key,
    /// persist local records, and wipe the temporary key.
    pub async fn complete_registration(
        &mut self,
        account_id: AccountId,
        device_number: u32,
    ) -> WalletResult<Device2RegistrationOutcome> {
        emit_linking(
            self.events.as_ref(),
            LinkingState::Registration,
            "registering this device",
        );

        let mut attempt = 0u32;
        let outcome = loop {
            attempt += 1;
            match self.try_register(&account_id, device_number).await {
                Ok(outcome) => break outcome,
                Err(err)
                    if attempt <= self.config.max_registration_retries
                        && is_retryable_registration_error(&err) =>
                {
                    log::warn!(
                        "device registration attempt {} failed ({}), retrying",
                        attempt,
                        err
                    );
                    tokio::time::sleep(Duration::from_millis(
                        self.config.registration_retry_delay_ms,
                    ))
                    .await;
                }
                Err(err) => {
                    emit_linking(self.events.as_ref(), LinkingState::Error, &err.message);
                    return Err(WalletError::new(
                        ErrorCode::RegistrationFailed,
                        format!("device registration failed: {}", err.message),
                    ));
                }
            }
        };

        // Success: the temporary key is spent; wipe it immediately.
        self.cleanup();
        emit_linking(
            self.events.as_ref(),
            LinkingState::LinkingComplete,
            "device linked",
        );
        emit_linking(
            self.events.as_ref(),
            LinkingState::AutoLogin,
            "VRF session opened for the linked account",
        );
        Ok(outcome)
    }

    /// Wipe the temporary key and cancel its scheduled wipe. Safe to call on
    /// any path: success, cancellation, or teardown.
    pub fn cleanup(&mut self) {
        if let Some(task) = self.wipe_task.take() {
            task.abort();
        }
        if let Some(key) = &self.temp_key {
            key.wipe();
        }
    }

    fn schedule_wipe(&mut self, key: &EphemeralKey) {
        let key = key.clone();
        let ttl = self.config.temp_key_ttl_ms;
        self.wipe_task = Some(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ttl)).await;
            key.wipe();
        }));
    }

    async fn run_credential_ceremony(
        &self,
        account_id: &AccountId,
        device_number: Option<u32>,
    ) -> WalletResult<(RegistrationCeremony, String)> {
        let block = self.wallet.rpc.view_block(Finality::Final).await?;
        let input = VrfInputData {
            user_id: account_id.as_str().to_string(),
            rp_id: self.wallet.host.rp_id.clone(),
            block_height: block.height,
            block_hash: block.hash_bytes()?,
        };
        let bootstrap = self
            .wallet
            .vrf
            .generate_bootstrap(account_id.clone(), Some(input))
            .await?;
        let challenge = bootstrap
            .challenge
            .ok_or_else(|| WalletError::internal("bootstrap did not produce a challenge"))?;

        let ceremony = self
            .wallet
            .credentials
            .create_credential(CreateCredentialRequest {
                account_id: account_id.clone(),
                rp_id: self.wallet.host.rp_id.clone(),
                challenge_b64u: challenge.vrf_output_b64u.clone(),
                device_number,
            })
            .await?;
        ceremony.prf_outputs.ensure_present()?;

        let derived = self
            .wallet
            .signer
            .derive_keypair_and_encrypt(DeriveKeypairRequest {
                account_id: account_id.clone(),
                prf_key_salt_b64u: ceremony.prf_outputs.key_salt_b64u.clone(),
                registration_tx: None,
            })
            .await?;
        Ok((ceremony, derived.public_key))
    }

    async fn try_register(
        &self,
        account_id: &AccountId,
        device_number: u32,
    ) -> WalletResult<Device2RegistrationOutcome> {
        let wallet = self.wallet;

        // Ceremony: reuse the QR-time one when the account was known.
        let ceremony = match &self.qr_ceremony {
            Some(ceremony) => ceremony.clone(),
            None => {
                self.run_credential_ceremony(account_id, Some(device_number))
                    .await?
                    .0
            }
        };

        let seed_prf = &ceremony.prf_outputs;
        let derived = wallet
            .signer
            .derive_keypair_and_encrypt(DeriveKeypairRequest {
                account_id: account_id.clone(),
                prf_key_salt_b64u: seed_prf.key_salt_b64u.clone(),
                registration_tx: None,
            })
            .await?;
        let new_public_key = derived.public_key.clone();

        let block = wallet.rpc.view_block(Finality::Final).await?;

        // Key swap: spend the temporary key to introduce the deterministic
        // one, then delete itself. One transaction, two actions.
        if let Some(temp_key) = &self.temp_key {
            let temp_private = temp_key.private_key()?;
            let temp_view = wallet
                .rpc
                .view_access_key(account_id, temp_key.public_key())
                .await?;
            let swap = wallet
                .signer
                .sign_with_keypair(SignWithKeypairRequest {
                    private_key: temp_private,
                    signer_id: account_id.clone(),
                    receiver_id: account_id.clone(),
                    nonce: temp_view.nonce + 1,
                    block_hash: block.hash.clone(),
                    actions: vec![
                        ActionParams::AddKey {
                            public_key: new_public_key.clone(),
                            access_key: AccessKey::full_access(),
                        },
                        ActionParams::DeleteKey {
                            public_key: temp_key.public_key().to_string(),
                        },
                    ],
                })
                .await?;
            wallet
                .rpc
                .send_tx(&swap.to_send_tx_base64()?, TxWaitUntil::Final)
                .await?
                .into_result()?;
        }

        // Deterministic VRF keypair plus a fresh challenge from it; its proof
        // goes into the registration call.
        let input = VrfInputData {
            user_id: account_id.as_str().to_string(),
            rp_id: wallet.host.rp_id.clone(),
            block_height: block.height,
            block_hash: block.hash_bytes()?,
        };
        let vrf = wallet
            .vrf
            .derive_deterministic(
                account_id.clone(),
                seed_prf.vrf_salt_b64u.clone(),
                Some(input),
            )
            .await?;
        let vrf_challenge = vrf
            .challenge
            .clone()
            .ok_or_else(|| WalletError::internal("deterministic derivation lost the challenge"))?;

        // Registration transaction, signed with the new key's first nonce.
        let new_key_view = wallet.rpc.view_access_key(account_id, &new_public_key).await?;
        let registered = wallet
            .signer
            .derive_keypair_and_encrypt(DeriveKeypairRequest {
                account_id: account_id.clone(),
                prf_key_salt_b64u: seed_prf.key_salt_b64u.clone(),
                registration_tx: Some(LinkRegistrationTx {
                    contract_id: wallet.contract_id.clone(),
                    vrf_data: VrfData::try_from(&vrf_challenge)?,
                    deterministic_vrf_public_key: base64_url_decode(&vrf.vrf_public_key_b64u)?,
                    webauthn_registration: ceremony.credential.clone(),
                    authenticator_options: None,
                    nonce: new_key_view.nonce + 1,
                    block_hash: block.hash.clone(),
                }),
            })
            .await?;
        let registration_tx = registered
            .signed_registration_tx
            .ok_or_else(|| WalletError::internal("registration transaction was not signed"))?;
        wallet
            .rpc
            .send_tx(&registration_tx.to_send_tx_base64()?, TxWaitUntil::Final)
            .await?
            .into_result()?;

        self.persist_device(account_id, device_number, &new_public_key, &vrf, &ceremony)
            .await?;

        Ok(Device2RegistrationOutcome {
            account_id: account_id.clone(),
            device_number,
            near_public_key: new_public_key,
            vrf_public_key_b64u: vrf.vrf_public_key_b64u,
        })
    }

    async fn persist_device(
        &self,
        account_id: &AccountId,
        device_number: u32,
        near_public_key: &str,
        vrf: &passkey_vrf_worker::DeterministicVrfResult,
        ceremony: &RegistrationCeremony,
    ) -> WalletResult<()> {
        let wallet = self.wallet;
        let now = wallet.clock.now_ms();

        let user = UserRecord {
            account_id: account_id.clone(),
            near_public_key: near_public_key.to_string(),
            device_number,
            vrf_public_key_b64u: vrf.vrf_public_key_b64u.clone(),
            registered_at_ms: now,
        };
        store::put_typed(
            wallet.store.as_ref(),
            store::namespaces::USERS,
            account_id.as_str(),
            &user,
        )
        .await?;

        let credential_public_key =
            extract_credential_public_key(&ceremony.credential.response.attestation_object)?;
        let authenticator = AuthenticatorRecord {
            credential_id: ceremony.credential.id.clone(),
            credential_public_key_b64u: base64_url_encode(&credential_public_key),
            transports: ceremony
                .credential
                .response
                .transports
                .clone()
                .unwrap_or_default(),
            device_number,
            vrf_public_keys: vec![vrf.vrf_public_key_b64u.clone()],
            registered_at_ms: now,
        };
        store::put_typed(
            wallet.store.as_ref(),
            store::namespaces::AUTHENTICATORS,
            &authenticator_key(account_id, &ceremony.credential.id),
            &authenticator,
        )
        .await?;

        let vrf_record = EncryptedVrfKeyRecord {
            account_id: account_id.clone(),
            vrf_public_key_b64u: vrf.vrf_public_key_b64u.clone(),
            ciphertext_b64u: vrf.encrypted.ciphertext_b64u.clone(),
            nonce_b64u: vrf.encrypted.nonce_b64u.clone(),
            server_wrapped: None,
        };
        store::put_typed(
            wallet.store.as_ref(),
            store::namespaces::NEAR_KEYS,
            &format!("{}:vrf", account_id),
            &vrf_record,
        )
        .await
    }
}

/// The closed list of causes worth retrying: credential UI contention,
/// network trouble, and anything the platform reports as transient.
fn is_retryable_registration_error(err: &WalletError) -> bool {
    if matches!(
        err.code,
        ErrorCode::CredentialRequestBusy | ErrorCode::RpcHttp | ErrorCode::RpcEmpty
    ) {
        return true;
    }
    let message = err.message.to_ascii_lowercase();
    ["operation is not allowed", "not allowed", "already pending", "network", "timeout", "temporar"]
        .iter()
        .any(|marker| message.contains(marker))
}

// === DEVICE 1 ===

pub struct Device1AuthorizationResult {
    pub broadcast_hashes: Vec<String>,
    /// Pre-signed DeleteKey for the introduced key, retained for
    /// timeout-driven cleanup. Never broadcast here.
    pub cleanup_tx: SignedTransactionEnvelope,
}

impl TransactionOrchestrator {
    /// Device-1 side: scan, then authorize with one assertion over three
    /// transactions. The AddKey and mapping calls are broadcast; the
    /// DeleteKey is returned pre-signed.
    pub async fn authorize_device_link(
        &self,
        account_id: AccountId,
        qr_payload: &str,
        events: Option<LinkingEventSender>,
    ) -> WalletResult<Device1AuthorizationResult> {
        emit_linking(events.as_ref(), LinkingState::Scanning, "decoding QR payload");
        let qr = DeviceLinkingQr::from_payload(qr_payload)?;
        emit_linking(
            events.as_ref(),
            LinkingState::Authorization,
            "authorizing new device",
        );

        let user: UserRecord = store::get_typed(
            self.store.as_ref(),
            store::namespaces::USERS,
            account_id.as_str(),
        )
        .await?
        .ok_or_else(|| {
            WalletError::new(
                ErrorCode::UserNotFound,
                format!("no user record for {}", account_id),
            )
        })?;

        self.nonce
            .set_identity(account_id.clone(), user.near_public_key.clone());
        let context = self.nonce.get_context().await?;

        let status = self.vrf.is_active(Some(account_id.clone())).await?;
        if !status.active {
            return Err(WalletError::new(
                ErrorCode::VrfLocked,
                "VRF session is locked; unlock before authorizing",
            ));
        }
        let challenge = self
            .vrf
            .challenge(VrfInputData {
                user_id: account_id.as_str().to_string(),
                rp_id: self.host.rp_id.clone(),
                block_height: context.block_height,
                block_hash: bs58::decode(&context.block_hash)
                    .into_vec()
                    .map_err(|e| WalletError::internal(format!("cached block hash invalid: {}", e)))?,
            })
            .await?;

        let ceremony = self
            .credentials
            .get_assertion(GetAssertionRequest {
                account_id: account_id.clone(),
                rp_id: self.host.rp_id.clone(),
                challenge_b64u: challenge.webauthn_challenge_b64u().to_string(),
                allowed_credential_ids: Vec::new(),
            })
            .await?;
        ceremony.prf_outputs.ensure_present()?;

        let mapping_args = json!({ "device_public_key": qr.device2_public_key });
        let transactions = vec![
            TransactionSigningRequest {
                receiver_id: account_id.clone(),
                actions: vec![ActionParams::AddKey {
                    public_key: qr.device2_public_key.clone(),
                    access_key: AccessKey::full_access(),
                }],
            },
            TransactionSigningRequest {
                receiver_id: self.contract_id.clone(),
                actions: vec![ActionParams::FunctionCall {
                    method_name: contract_methods::STORE_DEVICE_LINKING_MAPPING.to_string(),
                    args: mapping_args.to_string(),
                    gas: DEFAULT_FUNCTION_CALL_GAS.to_string(),
                    deposit: "0".to_string(),
                }],
            },
            TransactionSigningRequest {
                receiver_id: account_id.clone(),
                actions: vec![ActionParams::DeleteKey {
                    public_key: qr.device2_public_key.clone(),
                }],
            },
        ];

        let signed = self
            .signer
            .sign_transactions(
                SignTransactionsRequest {
                    account_id: account_id.clone(),
                    transactions,
                    base_nonce: context.next_nonce,
                    block_hash: context.block_hash.clone(),
                    vrf_challenge: challenge,
                    credential: ceremony.credential.clone(),
                    prf_key_salt_b64u: ceremony.prf_outputs.key_salt_b64u.clone(),
                    contract_id: self.contract_id.clone(),
                },
                None,
            )
            .await?;

        let mut envelopes = signed.signed_transactions.into_iter();
        let add_key_tx = envelopes.next().ok_or_else(|| WalletError::internal("missing AddKey tx"))?;
        let mapping_tx = envelopes.next().ok_or_else(|| WalletError::internal("missing mapping tx"))?;
        let cleanup_tx = envelopes.next().ok_or_else(|| WalletError::internal("missing cleanup tx"))?;

        // Broadcast in order: the key must exist before the mapping is read.
        let mut broadcast_hashes = Vec::with_capacity(2);
        for envelope in [&add_key_tx, &mapping_tx] {
            let outcome = self
                .rpc
                .send_tx(&envelope.to_send_tx_base64()?, TxWaitUntil::Final)
                .await?
                .into_result()?;
            broadcast_hashes.push(
                outcome
                    .transaction_hash()
                    .unwrap_or_else(|| envelope.transaction_hash.clone()),
            );
        }

        emit_linking(
            events.as_ref(),
            LinkingState::Authorization,
            "new device authorized",
        );
        Ok(Device1AuthorizationResult {
            broadcast_hashes,
            cleanup_tx,
        })
    }
}
