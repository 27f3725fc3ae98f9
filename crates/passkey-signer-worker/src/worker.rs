//! The signer worker actor and its handle.

use std::sync::Arc;

use log::debug;
use serde_json::json;
use tokio::sync::{mpsc, oneshot};

use passkey_chain_client::ChainRpc;
use passkey_core::clock::SharedClock;
use passkey_core::config::contract_methods;
use passkey_core::crypto::{
    derive_kek, derive_signing_seed_from_prf, ed25519_keypair_from_seed, encrypt_private_key,
};
use passkey_core::encoders::encode_near_secret_key;
use passkey_core::errors::{ErrorCode, WalletError, WalletResult};
use passkey_core::events::{emit, ActionPhase, ProgressSender, ProgressStatus};
use passkey_core::store::{self, EncryptedKeyRecord, KeyValueStore};
use passkey_core::actions::ActionParams;

use crate::config::LINK_DEVICE_REGISTRATION_GAS;
use crate::signing::{
    near_public_key_of, sign_batch, signing_key_from_near_private_key, unlock_signing_key,
};
use crate::nep413::{sign_nep413, Nep413Payload};
use crate::types::{
    DecryptPrivateKeyRequest, DecryptPrivateKeyResult, DeriveKeypairRequest, DeriveKeypairResult,
    LinkRegistrationTx, SignNep413Request, SignNep413Result, SignTransactionsRequest,
    SignTransactionsResult, SignWithKeypairRequest, TransactionSigningRequest,
};
use crate::verify::{check_assertion_binding, check_vrf_challenge, verify_authentication_on_chain};

const REQUEST_CHANNEL_CAPACITY: usize = 16;

pub struct SignerWorkerConfig {
    pub store: Arc<dyn KeyValueStore>,
    pub rpc: Arc<dyn ChainRpc>,
    pub clock: SharedClock,
}

enum SignerRequest {
    SignTransactions {
        request: SignTransactionsRequest,
        progress: Option<ProgressSender>,
        reply: oneshot::Sender<WalletResult<SignTransactionsResult>>,
    },
    SignWithKeypair {
        request: SignWithKeypairRequest,
        reply: oneshot::Sender<WalletResult<passkey_core::near::SignedTransactionEnvelope>>,
    },
    DeriveKeypair {
        request: DeriveKeypairRequest,
        reply: oneshot::Sender<WalletResult<DeriveKeypairResult>>,
    },
    DecryptPrivateKey {
        request: DecryptPrivateKeyRequest,
        reply: oneshot::Sender<WalletResult<DecryptPrivateKeyResult>>,
    },
    SignNep413 {
        request: SignNep413Request,
        reply: oneshot::Sender<WalletResult<SignNep413Result>>,
    },
}

#[derive(Clone)]
pub struct SignerWorkerHandle {
    tx: mpsc::Sender<SignerRequest>,
}

impl SignerWorkerHandle {
    pub fn spawn(config: SignerWorkerConfig) -> Self {
        let (tx, rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
        tokio::spawn(run_worker(config, rx));
        SignerWorkerHandle { tx }
    }

    /// Passkey signing path; progress events go to `progress` if provided.
    pub async fn sign_transactions(
        &self,
        request: SignTransactionsRequest,
        progress: Option<ProgressSender>,
    ) -> WalletResult<SignTransactionsResult> {
        self.call(|reply| SignerRequest::SignTransactions {
            request,
            progress,
            reply,
        })
        .await?
    }

    /// Raw-keypair signing path.
    pub async fn sign_with_keypair(
        &self,
        request: SignWithKeypairRequest,
    ) -> WalletResult<passkey_core::near::SignedTransactionEnvelope> {
        self.call(|reply| SignerRequest::SignWithKeypair { request, reply })
            .await?
    }

    /// Derive the account's signing key from a PRF output and store it
    /// encrypted. Also the recovery path: the derivation is deterministic, so
    /// re-running it on a new device reproduces the same key.
    pub async fn derive_keypair_and_encrypt(
        &self,
        request: DeriveKeypairRequest,
    ) -> WalletResult<DeriveKeypairResult> {
        self.call(|reply| SignerRequest::DeriveKeypair { request, reply })
            .await?
    }

    /// Sign an off-chain NEP-413 message with the stored key.
    pub async fn sign_nep413_message(
        &self,
        request: SignNep413Request,
    ) -> WalletResult<SignNep413Result> {
        self.call(|reply| SignerRequest::SignNep413 { request, reply })
            .await?
    }

    /// Export the plaintext private key. Explicit user action only.
    pub async fn decrypt_private_key(
        &self,
        request: DecryptPrivateKeyRequest,
    ) -> WalletResult<DecryptPrivateKeyResult> {
        self.call(|reply| SignerRequest::DecryptPrivateKey { request, reply })
            .await?
    }

    async fn call<T>(
        &self,
        make_request: impl FnOnce(oneshot::Sender<T>) -> SignerRequest,
    ) -> WalletResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make_request(reply))
            .await
            .map_err(|_| worker_gone())?;
        rx.await.map_err(|_| worker_gone())
    }
}

fn worker_gone() -> WalletError {
    WalletError::new(ErrorCode::IpcNotReady, "signer worker is not running")
}

async fn run_worker(config: SignerWorkerConfig, mut rx: mpsc::Receiver<SignerRequest>) {
    while let Some(request) = rx.recv().await {
        match request {
            SignerRequest::SignTransactions {
                request,
                progress,
                reply,
            } => {
                let _ = reply.send(handle_sign_transactions(&config, request, progress).await);
            }
            SignerRequest::SignWithKeypair { request, reply } => {
                let _ = reply.send(handle_sign_with_keypair(request));
            }
            SignerRequest::DeriveKeypair { request, reply } => {
                let _ = reply.send(handle_derive_keypair(&config, request).await);
            }
            SignerRequest::DecryptPrivateKey { request, reply } => {
                let _ = reply.send(handle_decrypt_private_key(&config, request).await);
            }
            SignerRequest::SignNep413 { request, reply } => {
                let _ = reply.send(handle_sign_nep413(&config, request).await);
            }
        }
    }
}

async fn handle_sign_nep413(
    config: &SignerWorkerConfig,
    request: SignNep413Request,
) -> WalletResult<SignNep413Result> {
    let signing_key = unlock_signing_key(
        config.store.as_ref(),
        &request.account_id,
        &request.prf_key_salt_b64u,
    )
    .await?;
    let payload = Nep413Payload::new(
        request.message,
        request.recipient,
        &request.nonce_b64u,
        request.callback_url,
    )?;
    let signature_b64 = sign_nep413(&signing_key, &payload)?;
    Ok(SignNep413Result {
        account_id: request.account_id,
        public_key: near_public_key_of(&signing_key),
        signature_b64,
    })
}

async fn handle_sign_transactions(
    config: &SignerWorkerConfig,
    request: SignTransactionsRequest,
    progress: Option<ProgressSender>,
) -> WalletResult<SignTransactionsResult> {
    let progress = progress.as_ref();
    let clock = config.clock.as_ref();
    let mut logs = Vec::new();

    if request.transactions.is_empty() {
        return Err(WalletError::input_invalid("no transactions provided"));
    }

    emit(
        progress,
        clock,
        ActionPhase::WebauthnAuthentication,
        ProgressStatus::Progress,
        "verifying VRF challenge and WebAuthn assertion",
        None,
    );

    let vrf_data = check_vrf_challenge(&request.vrf_challenge)?;
    check_assertion_binding(&request.credential, &request.vrf_challenge)?;
    let contract_logs = verify_authentication_on_chain(
        config.rpc.as_ref(),
        &request.contract_id,
        &vrf_data,
        &request.credential,
    )
    .await?;
    logs.extend(contract_logs);
    logs.push("authentication verified on-chain".to_string());

    emit(
        progress,
        clock,
        ActionPhase::AuthenticationComplete,
        ProgressStatus::Success,
        "authentication verified",
        None,
    );
    emit(
        progress,
        clock,
        ActionPhase::TransactionSigningProgress,
        ProgressStatus::Progress,
        "decrypting key and signing transactions",
        Some(json!({ "transaction_count": request.transactions.len() })),
    );

    let signing_key = unlock_signing_key(
        config.store.as_ref(),
        &request.account_id,
        &request.prf_key_salt_b64u,
    )
    .await?;

    let signed = sign_batch(
        &signing_key,
        &request.account_id,
        &request.transactions,
        request.base_nonce,
        &request.block_hash,
    )?;
    logs.push(format!("signed {} transactions", signed.len()));
    debug!(
        "signed {} transactions for {} (nonces {}..={})",
        signed.len(),
        request.account_id,
        request.base_nonce,
        request.base_nonce + signed.len() as u64 - 1
    );

    emit(
        progress,
        clock,
        ActionPhase::TransactionSigningComplete,
        ProgressStatus::Success,
        "transactions signed",
        Some(json!({ "transaction_count": signed.len() })),
    );

    Ok(SignTransactionsResult {
        signed_transactions: signed,
        logs,
    })
}

fn handle_sign_with_keypair(
    request: SignWithKeypairRequest,
) -> WalletResult<passkey_core::near::SignedTransactionEnvelope> {
    let signing_key = signing_key_from_near_private_key(&request.private_key)?;
    let batch = sign_batch(
        &signing_key,
        &request.signer_id,
        &[TransactionSigningRequest {
            receiver_id: request.receiver_id,
            actions: request.actions,
        }],
        request.nonce,
        &request.block_hash,
    )?;
    Ok(batch.into_iter().next().expect("batch of one"))
}

async fn handle_derive_keypair(
    config: &SignerWorkerConfig,
    request: DeriveKeypairRequest,
) -> WalletResult<DeriveKeypairResult> {
    let seed = derive_signing_seed_from_prf(&request.prf_key_salt_b64u, &request.account_id)?;
    let (signing_key, _public_bytes) = ed25519_keypair_from_seed(&seed);
    let public_key = near_public_key_of(&signing_key);

    let kek = derive_kek(&request.prf_key_salt_b64u, &request.account_id)?;
    let encrypted = encrypt_private_key(&seed, kek.as_ref(), &request.account_id)?;

    let record = EncryptedKeyRecord {
        account_id: request.account_id.clone(),
        public_key: public_key.clone(),
        encrypted: encrypted.clone(),
        created_at_ms: config.clock.now_ms(),
    };
    store::put_typed(
        config.store.as_ref(),
        store::namespaces::NEAR_KEYS,
        request.account_id.as_str(),
        &record,
    )
    .await?;
    debug!("derived and stored encrypted key for {}", request.account_id);

    let signed_registration_tx = match request.registration_tx {
        None => None,
        Some(registration) => Some(sign_link_registration(
            &signing_key,
            &request.account_id,
            registration,
        )?),
    };

    Ok(DeriveKeypairResult {
        public_key,
        encrypted,
        signed_registration_tx,
    })
}

/// Sign the device-link registration call with a freshly derived key.
fn sign_link_registration(
    signing_key: &ed25519_dalek::SigningKey,
    account_id: &passkey_core::AccountId,
    registration: LinkRegistrationTx,
) -> WalletResult<passkey_core::near::SignedTransactionEnvelope> {
    let args = json!({
        "vrf_data": registration.vrf_data,
        "webauthn_registration": registration.webauthn_registration,
        "deterministic_vrf_public_key": registration.deterministic_vrf_public_key,
        "authenticator_options": registration.authenticator_options,
    });
    let batch = sign_batch(
        signing_key,
        account_id,
        &[TransactionSigningRequest {
            receiver_id: registration.contract_id,
            actions: vec![ActionParams::FunctionCall {
                method_name: contract_methods::LINK_DEVICE_REGISTER_USER.to_string(),
                args: args.to_string(),
                gas: LINK_DEVICE_REGISTRATION_GAS.to_string(),
                deposit: "0".to_string(),
            }],
        }],
        registration.nonce,
        &registration.block_hash,
    )?;
    Ok(batch.into_iter().next().expect("batch of one"))
}

async fn handle_decrypt_private_key(
    config: &SignerWorkerConfig,
    request: DecryptPrivateKeyRequest,
) -> WalletResult<DecryptPrivateKeyResult> {
    let signing_key = unlock_signing_key(
        config.store.as_ref(),
        &request.account_id,
        &request.prf_key_salt_b64u,
    )
    .await?;
    let public_bytes = signing_key.verifying_key().to_bytes();
    Ok(DecryptPrivateKeyResult {
        private_key: encode_near_secret_key(&signing_key.to_bytes(), &public_bytes),
        public_key: near_public_key_of(&signing_key),
    })
}
