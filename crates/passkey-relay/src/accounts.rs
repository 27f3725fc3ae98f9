//! Account creation and authentication verification.
//!
//! Everything that signs with the relay key is serialized through the
//! transaction queue. All operations are idempotent with respect to
//! identical inputs: a duplicate create for an existing account fails with
//! `ACCOUNT_ALREADY_EXISTS` before anything is broadcast.

use std::sync::Arc;
use std::time::Duration;

use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use passkey_chain_client::outcome::TxExecutionOutcome;
use passkey_chain_client::{ChainRpc, Finality, TxWaitUntil};
use passkey_core::config::contract_methods;
use passkey_core::encoders::decode_near_secret_key;
use passkey_core::errors::{ErrorCode, WalletError, WalletResult};
use passkey_core::near::{
    build_transaction, sign_transaction, AccessKey, Action, Balance, CryptoHash,
    FunctionCallAction, PublicKey, SignedTransactionEnvelope,
};
use passkey_core::AccountId;

use crate::queue::TransactionQueue;
use crate::session::SessionService;

const EXISTS_CHECK_ATTEMPTS: u32 = 3;
const EXISTS_CHECK_BACKOFF_MS: u64 = 250;

pub struct AccountServiceConfig {
    pub relayer_account_id: AccountId,
    /// `ed25519:<base58 64B>` relay signing key.
    pub relayer_private_key: String,
    pub webauthn_contract_id: AccountId,
    /// Balance attached to created accounts, in yocto units.
    pub account_initial_balance: Balance,
    pub create_and_register_gas: u64,
    /// Surface persistent transient errors from the existence probe instead
    /// of mapping them to "not found".
    pub strict_exists_check: bool,
}

pub struct AccountService {
    rpc: Arc<dyn ChainRpc>,
    queue: Arc<TransactionQueue>,
    sessions: Arc<SessionService>,
    config: AccountServiceConfig,
    signing_key: SigningKey,
    relayer_public_key: PublicKey,
}

/// Request body for atomic create + register. The contract-shaped fields are
/// passed through verbatim; the relay does not interpret them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateAccountAndRegisterRequest {
    pub new_account_id: AccountId,
    pub new_public_key: String,
    pub vrf_data: Value,
    pub webauthn_registration: Value,
    pub deterministic_vrf_public_key: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticator_options: Option<Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateAccountResult {
    pub account_id: AccountId,
    pub transaction_hash: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerifyAuthenticationResult {
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_credential: Option<String>,
    #[serde(default)]
    pub logs: Vec<String>,
}

impl AccountService {
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        queue: Arc<TransactionQueue>,
        sessions: Arc<SessionService>,
        config: AccountServiceConfig,
    ) -> WalletResult<Self> {
        let (seed, public) = decode_near_secret_key(&config.relayer_private_key)?;
        Ok(AccountService {
            rpc,
            queue,
            sessions,
            config,
            signing_key: SigningKey::from_bytes(&seed),
            relayer_public_key: PublicKey::from_ed25519_bytes(&public),
        })
    }

    /// Probe account existence with bounded retries. "Does not exist"
    /// answers map to `false`; persistently transient errors also map to
    /// `false` (the safety valve) unless strict mode is on.
    pub async fn check_account_exists(&self, account_id: &AccountId) -> WalletResult<bool> {
        let mut last_error: Option<WalletError> = None;
        for attempt in 0..EXISTS_CHECK_ATTEMPTS {
            match self.rpc.view_account(account_id).await {
                Ok(_) => return Ok(true),
                Err(err) if is_account_missing_error(&err) => return Ok(false),
                Err(err) if is_transient_rpc_error(&err) => {
                    last_error = Some(err);
                    let backoff = EXISTS_CHECK_BACKOFF_MS << attempt;
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }
                Err(err) => return Err(err),
            }
        }

        let last_error = last_error.unwrap_or_else(|| WalletError::internal("probe failed"));
        if self.config.strict_exists_check {
            return Err(last_error);
        }
        warn!(
            account_id = %account_id,
            error = %last_error,
            "existence probe kept failing transiently; treating account as missing"
        );
        Ok(false)
    }

    /// Plain account creation: `[CreateAccount, Transfer(initial),
    /// AddKey(full)]` signed by the relay key.
    pub async fn create_account(
        &self,
        account_id: AccountId,
        public_key: &str,
    ) -> WalletResult<CreateAccountResult> {
        let new_key = PublicKey::parse(public_key)?;
        if self.check_account_exists(&account_id).await? {
            return Err(WalletError::new(
                ErrorCode::AccountAlreadyExists,
                format!("{} already exists", account_id),
            ));
        }

        let actions = vec![
            Action::CreateAccount,
            Action::Transfer {
                deposit: self.config.account_initial_balance,
            },
            Action::AddKey {
                public_key: new_key,
                access_key: AccessKey::full_access(),
            },
        ];
        let outcome = self.broadcast_as_relayer(account_id.clone(), actions).await?;
        info!(account_id = %account_id, "created account");
        Ok(CreateAccountResult {
            account_id,
            transaction_hash: outcome.transaction_hash(),
        })
    }

    /// Atomic create + register: one deposit-bearing call to the registry
    /// contract, which creates the account and stores the authenticator in
    /// the same receipt tree.
    pub async fn create_account_and_register_user(
        &self,
        request: CreateAccountAndRegisterRequest,
    ) -> WalletResult<CreateAccountResult> {
        if self.check_account_exists(&request.new_account_id).await? {
            return Err(WalletError::new(
                ErrorCode::AccountAlreadyExists,
                format!("{} already exists", request.new_account_id),
            ));
        }

        let args = json!({
            "new_account_id": request.new_account_id,
            "new_public_key": request.new_public_key,
            "vrf_data": request.vrf_data,
            "webauthn_registration": request.webauthn_registration,
            "deterministic_vrf_public_key": request.deterministic_vrf_public_key,
            "authenticator_options": request.authenticator_options,
        });
        let actions = vec![Action::FunctionCall(Box::new(FunctionCallAction {
            method_name: contract_methods::CREATE_ACCOUNT_AND_REGISTER_USER.to_string(),
            args: args.to_string().into_bytes(),
            gas: self.config.create_and_register_gas,
            deposit: self.config.account_initial_balance,
        }))];

        let outcome = self
            .broadcast_as_relayer(self.config.webauthn_contract_id.clone(), actions)
            .await?;
        info!(account_id = %request.new_account_id, "created and registered account");
        Ok(CreateAccountResult {
            account_id: request.new_account_id,
            transaction_hash: outcome.transaction_hash(),
        })
    }

    /// Read-only authentication check; a verified result carries a session
    /// credential for the authenticated subject.
    pub async fn verify_authentication(
        &self,
        vrf_data: Value,
        webauthn_authentication: Value,
    ) -> WalletResult<VerifyAuthenticationResult> {
        let subject = vrf_data
            .get("user_id")
            .and_then(Value::as_str)
            .map(str::to_string);
        let args = json!({
            "vrf_data": vrf_data,
            "webauthn_authentication": webauthn_authentication,
        });
        let result = self
            .rpc
            .call_function(
                &self.config.webauthn_contract_id,
                contract_methods::VERIFY_AUTHENTICATION_RESPONSE,
                &args,
            )
            .await?;

        let verified = result
            .value
            .get("verified")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let session_credential = match (verified, subject) {
            (true, Some(subject)) => Some(self.sessions.sign(&subject, None)?),
            _ => None,
        };
        Ok(VerifyAuthenticationResult {
            verified,
            session_credential,
            logs: result.logs,
        })
    }

    /// Build, sign, and broadcast a relay-signed transaction under the queue.
    async fn broadcast_as_relayer(
        &self,
        receiver_id: AccountId,
        actions: Vec<Action>,
    ) -> WalletResult<TxExecutionOutcome> {
        self.queue
            .run(async {
                let relayer = &self.config.relayer_account_id;
                let relayer_public_key_str = self.relayer_public_key.to_near_string();
                let (key, block) = tokio::try_join!(
                    self.rpc.view_access_key(relayer, &relayer_public_key_str),
                    self.rpc.view_block(Finality::Final),
                )?;

                let transaction = build_transaction(
                    relayer.clone(),
                    receiver_id,
                    self.relayer_public_key.clone(),
                    key.nonce + 1,
                    CryptoHash::from_base58(&block.hash)?,
                    actions,
                );
                let envelope = SignedTransactionEnvelope::from_signed(sign_transaction(
                    transaction,
                    &self.signing_key,
                )?)?;

                self.rpc
                    .send_tx(&envelope.to_send_tx_base64()?, TxWaitUntil::ExecutedOptimistic)
                    .await?
                    .into_result()
            })
            .await
    }
}

/// Heuristic mapping of RPC errors that mean "the account does not exist".
fn is_account_missing_error(err: &WalletError) -> bool {
    if err.code == ErrorCode::AccountDoesNotExist {
        return true;
    }
    let text = err.message.to_ascii_lowercase();
    let details = err
        .details
        .as_ref()
        .map(|d| d.to_string().to_ascii_lowercase())
        .unwrap_or_default();
    ["does not exist", "unknown_account", "unknown account"]
        .iter()
        .any(|marker| text.contains(marker) || details.contains(marker))
}

/// Errors worth retrying before concluding anything.
fn is_transient_rpc_error(err: &WalletError) -> bool {
    if matches!(err.code, ErrorCode::RpcHttp | ErrorCode::RpcEmpty) {
        return true;
    }
    let text = err.message.to_ascii_lowercase();
    ["timeout", "timed out", "temporar", "connection", "network"]
        .iter()
        .any(|marker| text.contains(marker))
}
