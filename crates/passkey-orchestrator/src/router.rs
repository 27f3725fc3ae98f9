//! Wallet-side dispatch for the isolation transport.
//!
//! The application frame can only reach what this router exposes. Store
//! access is limited to an allowlist of benign namespaces; key material and
//! credentials never cross the channel.

use async_trait::async_trait;

use passkey_core::encoders::base64_url_encode;
use passkey_core::errors::{ErrorCode, WalletError, WalletResult};
use passkey_core::events::ProgressSender;
use passkey_core::store;
use passkey_core::AccountId;
use passkey_signer_worker::types::{DeriveKeypairRequest, SignNep413Request};
use passkey_transport::{WalletRequest, WalletResponse, WalletService};
use tokio_util::sync::CancellationToken;

use crate::credentials::GetAssertionRequest;
use crate::orchestrator::{CallHooks, ExecuteOptions, TransactionOrchestrator};

/// Namespaces the application may read and write through the transport.
const APP_STORE_NAMESPACES: [&str; 2] = [
    store::namespaces::PREFERENCES,
    store::namespaces::CONFIRMATION_CONFIG,
];

pub struct WalletRouter {
    pub orchestrator: TransactionOrchestrator,
}

impl WalletRouter {
    pub fn new(orchestrator: TransactionOrchestrator) -> Self {
        WalletRouter { orchestrator }
    }

    /// Run an assertion ceremony purely to obtain PRF outputs (key derivation
    /// and message signing need no VRF challenge).
    async fn assertion_prf(&self, account_id: &AccountId) -> WalletResult<(String, String)> {
        let mut challenge = [0u8; 32];
        getrandom::getrandom(&mut challenge)
            .map_err(|e| WalletError::internal(format!("challenge generation failed: {}", e)))?;
        let ceremony = self
            .orchestrator
            .credentials
            .get_assertion(GetAssertionRequest {
                account_id: account_id.clone(),
                rp_id: self.orchestrator.host.rp_id.clone(),
                challenge_b64u: base64_url_encode(&challenge),
                allowed_credential_ids: Vec::new(),
            })
            .await?;
        ceremony.prf_outputs.ensure_present()?;
        Ok((
            ceremony.prf_outputs.key_salt_b64u.clone(),
            ceremony.prf_outputs.vrf_salt_b64u.clone(),
        ))
    }

    async fn derive_or_recover(&self, account_id: AccountId) -> WalletResult<WalletResponse> {
        let (key_salt, _vrf_salt) = self.assertion_prf(&account_id).await?;
        let derived = self
            .orchestrator
            .signer
            .derive_keypair_and_encrypt(DeriveKeypairRequest {
                account_id,
                prf_key_salt_b64u: key_salt,
                registration_tx: None,
            })
            .await?;
        Ok(WalletResponse::Keypair {
            public_key: derived.public_key,
        })
    }

    fn check_namespace(namespace: &str) -> WalletResult<()> {
        if APP_STORE_NAMESPACES.contains(&namespace) {
            return Ok(());
        }
        Err(WalletError::new(
            ErrorCode::InputInvalid,
            format!("namespace '{}' is not accessible over the transport", namespace),
        ))
    }
}

#[async_trait]
impl WalletService for WalletRouter {
    async fn handle(
        &self,
        request: WalletRequest,
        progress: Option<ProgressSender>,
    ) -> WalletResult<WalletResponse> {
        match request {
            WalletRequest::SignTransactions {
                account_id,
                transactions,
                execute_sequentially,
            } => {
                let result = self
                    .orchestrator
                    .execute_actions(
                        account_id,
                        transactions,
                        ExecuteOptions {
                            execute_sequentially,
                            progress,
                            cancel: CancellationToken::new(),
                            hooks: CallHooks::default(),
                            ..ExecuteOptions::default()
                        },
                    )
                    .await?;
                Ok(WalletResponse::SignedTransactions {
                    transaction_hashes: result
                        .broadcasts
                        .iter()
                        .map(|b| b.transaction_hash.clone())
                        .collect(),
                    transactions: result.signed_transactions,
                })
            }

            WalletRequest::RegisterUser {
                account_id,
                authenticator_options,
            } => {
                let result = self
                    .orchestrator
                    .register_user(account_id, authenticator_options)
                    .await?;
                Ok(WalletResponse::Registered {
                    near_public_key: result.near_public_key,
                    vrf_public_key_b64u: result.vrf_public_key_b64u,
                })
            }

            WalletRequest::SignNep413Message {
                account_id,
                message,
                recipient,
                nonce_b64u,
                callback_url,
            } => {
                let (key_salt, _) = self.assertion_prf(&account_id).await?;
                let signed = self
                    .orchestrator
                    .signer
                    .sign_nep413_message(SignNep413Request {
                        account_id,
                        prf_key_salt_b64u: key_salt,
                        message,
                        recipient,
                        nonce_b64u,
                        callback_url,
                    })
                    .await?;
                Ok(WalletResponse::SignedMessage {
                    public_key: signed.public_key,
                    signature_b64: signed.signature_b64,
                })
            }

            WalletRequest::DeriveKeypair { account_id }
            | WalletRequest::RecoverKeypair { account_id } => {
                self.derive_or_recover(account_id).await
            }

            WalletRequest::GetLastUser => {
                let value = self
                    .orchestrator
                    .store
                    .get(store::namespaces::LAST_USER, "current")
                    .await?;
                let account_id = match value {
                    None => None,
                    Some(value) => serde_json::from_value(value)
                        .map_err(|e| WalletError::internal(format!("corrupt last_user: {}", e)))?,
                };
                Ok(WalletResponse::LastUser { account_id })
            }

            WalletRequest::StoreGet { namespace, key } => {
                Self::check_namespace(&namespace)?;
                let value = self.orchestrator.store.get(&namespace, &key).await?;
                Ok(WalletResponse::StoreValue { value })
            }

            WalletRequest::StorePut {
                namespace,
                key,
                value,
            } => {
                Self::check_namespace(&namespace)?;
                self.orchestrator.store.put(&namespace, &key, value).await?;
                Ok(WalletResponse::Ack)
            }
        }
    }
}
