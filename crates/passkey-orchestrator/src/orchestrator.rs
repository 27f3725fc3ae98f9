//! The transaction pipeline.
//!
//! Phases: PREPARATION → GENERATING_CHALLENGE → WEBAUTHN_AUTHENTICATION →
//! AUTHENTICATION_COMPLETE → TRANSACTION_SIGNING_PROGRESS →
//! TRANSACTION_SIGNING_COMPLETE → BROADCASTING → ACTION_COMPLETE. Progress
//! events are emitted in non-decreasing phase order; any failure emits
//! ACTION_ERROR and surfaces a structured error.
//!
//! `before_call` runs exactly once before any validation, `after_call`
//! exactly once with the outcome; a failing hook never fails the call.

use std::future::Future;
use std::sync::Arc;

use futures::future::try_join_all;
use log::warn;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use passkey_chain_client::outcome::TxExecutionOutcome;
use passkey_chain_client::{ChainRpc, NonceManager, TxWaitUntil};
use passkey_core::clock::SharedClock;
use passkey_core::errors::{ErrorCode, WalletError, WalletResult};
use passkey_core::events::{emit, ActionPhase, ProgressSender, ProgressStatus};
use passkey_core::near::SignedTransactionEnvelope;
use passkey_core::store::{self, KeyValueStore, UserRecord};
use passkey_core::vrf::VrfInputData;
use passkey_core::AccountId;
use passkey_signer_worker::{SignTransactionsRequest, SignerWorkerHandle, TransactionSigningRequest};
use passkey_vrf_worker::VrfWorkerHandle;

use crate::credentials::{CredentialProvider, GetAssertionRequest, HostInfo};

/// Hook outcomes are logged, never propagated.
type Hook = Box<dyn Fn() -> WalletResult<()> + Send + Sync>;
type AfterHook = Box<dyn Fn(bool) -> WalletResult<()> + Send + Sync>;

#[derive(Default)]
pub struct CallHooks {
    pub before_call: Option<Hook>,
    pub after_call: Option<AfterHook>,
}

pub struct ExecuteOptions {
    /// Broadcast one at a time in input order instead of in parallel.
    pub execute_sequentially: bool,
    pub wait_until: TxWaitUntil,
    pub progress: Option<ProgressSender>,
    pub cancel: CancellationToken,
    pub hooks: CallHooks,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        ExecuteOptions {
            execute_sequentially: false,
            wait_until: TxWaitUntil::ExecutedOptimistic,
            progress: None,
            cancel: CancellationToken::new(),
            hooks: CallHooks::default(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct BroadcastResult {
    pub transaction_hash: String,
    pub outcome: TxExecutionOutcome,
}

#[derive(Clone, Debug)]
pub struct ExecuteResult {
    pub signed_transactions: Vec<SignedTransactionEnvelope>,
    pub broadcasts: Vec<BroadcastResult>,
}

pub struct TransactionOrchestrator {
    pub vrf: VrfWorkerHandle,
    pub signer: SignerWorkerHandle,
    pub credentials: Arc<dyn CredentialProvider>,
    pub rpc: Arc<dyn ChainRpc>,
    pub nonce: NonceManager,
    pub store: Arc<dyn KeyValueStore>,
    pub host: HostInfo,
    /// WebAuthn registry contract.
    pub contract_id: AccountId,
    pub clock: SharedClock,
}

impl TransactionOrchestrator {
    /// Run the full pipeline for one or many transactions sharing a signer.
    pub async fn execute_actions(
        &self,
        account_id: AccountId,
        transactions: Vec<TransactionSigningRequest>,
        options: ExecuteOptions,
    ) -> WalletResult<ExecuteResult> {
        if let Some(hook) = &options.hooks.before_call {
            if let Err(e) = hook() {
                warn!("before_call hook failed: {}", e);
            }
        }

        let result = self.execute_inner(&account_id, transactions, &options).await;

        if let Err(err) = &result {
            emit(
                options.progress.as_ref(),
                self.clock.as_ref(),
                ActionPhase::ActionError,
                ProgressStatus::Error,
                &err.message,
                Some(json!({ "code": err.code })),
            );
        }
        if let Some(hook) = &options.hooks.after_call {
            if let Err(e) = hook(result.is_ok()) {
                warn!("after_call hook failed: {}", e);
            }
        }
        result
    }

    async fn execute_inner(
        &self,
        account_id: &AccountId,
        transactions: Vec<TransactionSigningRequest>,
        options: &ExecuteOptions,
    ) -> WalletResult<ExecuteResult> {
        let progress = options.progress.as_ref();
        let clock = self.clock.as_ref();
        let cancel = &options.cancel;

        // PREPARATION: validate inputs and load the user record.
        emit(
            progress,
            clock,
            ActionPhase::Preparation,
            ProgressStatus::Progress,
            "validating transaction inputs",
            None,
        );
        if transactions.is_empty() {
            return Err(WalletError::input_invalid("no transactions provided"));
        }
        for (i, tx) in transactions.iter().enumerate() {
            if tx.actions.is_empty() {
                return Err(WalletError::input_invalid(format!(
                    "transaction {} has no actions",
                    i
                )));
            }
            for action in &tx.actions {
                action
                    .validate()
                    .map_err(|e| WalletError::input_invalid(format!("transaction {}: {}", i, e.message)))?;
            }
        }
        let user: UserRecord =
            store::get_typed(self.store.as_ref(), store::namespaces::USERS, account_id.as_str())
                .await?
                .ok_or_else(|| {
                    WalletError::new(
                        ErrorCode::UserNotFound,
                        format!("no user record for {}", account_id),
                    )
                })?;

        // Signing context (nonce + block), cached and coalesced.
        self.nonce
            .set_identity(account_id.clone(), user.near_public_key.clone());
        let context = cancellable(cancel, self.nonce.get_context()).await?;

        // GENERATING_CHALLENGE: the VRF session must be open for this user.
        emit(
            progress,
            clock,
            ActionPhase::GeneratingChallenge,
            ProgressStatus::Progress,
            "generating VRF challenge",
            None,
        );
        let status = cancellable(cancel, self.vrf.is_active(Some(account_id.clone()))).await?;
        if !status.active {
            return Err(WalletError::new(
                ErrorCode::VrfLocked,
                "VRF session is locked; unlock before signing",
            ));
        }
        let block_hash_bytes = bs58::decode(&context.block_hash)
            .into_vec()
            .map_err(|e| WalletError::internal(format!("cached block hash invalid: {}", e)))?;
        let challenge = cancellable(
            cancel,
            self.vrf.challenge(VrfInputData {
                user_id: account_id.as_str().to_string(),
                rp_id: self.host.rp_id.clone(),
                block_height: context.block_height,
                block_hash: block_hash_bytes,
            }),
        )
        .await?;

        // WEBAUTHN_AUTHENTICATION: one assertion covers the whole batch.
        emit(
            progress,
            clock,
            ActionPhase::WebauthnAuthentication,
            ProgressStatus::Progress,
            "requesting WebAuthn assertion",
            None,
        );
        let allowed_credential_ids = self.known_credential_ids(account_id).await;
        let ceremony = cancellable(
            cancel,
            self.credentials.get_assertion(GetAssertionRequest {
                account_id: account_id.clone(),
                rp_id: self.host.rp_id.clone(),
                challenge_b64u: challenge.webauthn_challenge_b64u().to_string(),
                allowed_credential_ids,
            }),
        )
        .await?;
        ceremony.prf_outputs.ensure_present()?;

        // Sign. The worker emits AUTHENTICATION_COMPLETE and the signing
        // phases on the same progress channel.
        let sign_result = cancellable(
            cancel,
            self.signer.sign_transactions(
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
                options.progress.clone(),
            ),
        )
        .await?;

        // BROADCASTING.
        emit(
            progress,
            clock,
            ActionPhase::Broadcasting,
            ProgressStatus::Progress,
            "broadcasting signed transactions",
            Some(json!({ "transaction_count": sign_result.signed_transactions.len() })),
        );
        let broadcasts = self
            .broadcast_all(&sign_result.signed_transactions, options)
            .await?;

        emit(
            progress,
            clock,
            ActionPhase::ActionComplete,
            ProgressStatus::Success,
            "transactions executed",
            Some(json!({
                "transaction_hashes": broadcasts
                    .iter()
                    .map(|b| b.transaction_hash.clone())
                    .collect::<Vec<_>>(),
            })),
        );

        Ok(ExecuteResult {
            signed_transactions: sign_result.signed_transactions,
            broadcasts,
        })
    }

    async fn broadcast_all(
        &self,
        signed: &[SignedTransactionEnvelope],
        options: &ExecuteOptions,
    ) -> WalletResult<Vec<BroadcastResult>> {
        if options.execute_sequentially {
            let mut results = Vec::with_capacity(signed.len());
            for envelope in signed {
                results.push(self.broadcast_one(envelope, options).await?);
            }
            return Ok(results);
        }
        try_join_all(
            signed
                .iter()
                .map(|envelope| self.broadcast_one(envelope, options)),
        )
        .await
    }

    async fn broadcast_one(
        &self,
        envelope: &SignedTransactionEnvelope,
        options: &ExecuteOptions,
    ) -> WalletResult<BroadcastResult> {
        let wire = envelope.to_send_tx_base64()?;
        let outcome = cancellable(
            &options.cancel,
            self.rpc.send_tx(&wire, options.wait_until),
        )
        .await?
        .into_result()?;
        Ok(BroadcastResult {
            transaction_hash: outcome
                .transaction_hash()
                .unwrap_or_else(|| envelope.transaction_hash.clone()),
            outcome,
        })
    }

    async fn known_credential_ids(&self, account_id: &AccountId) -> Vec<String> {
        let Ok(keys) = self
            .store
            .keys(store::namespaces::AUTHENTICATORS)
            .await
        else {
            return Vec::new();
        };
        let prefix = format!("{}:", account_id);
        keys.into_iter()
            .filter_map(|key| key.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }
}

/// Race a future against the ambient cancel token.
pub(crate) async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = WalletResult<T>>,
) -> WalletResult<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(WalletError::new(
            ErrorCode::Cancelled,
            "operation cancelled by caller",
        )),
        result = fut => result,
    }
}
