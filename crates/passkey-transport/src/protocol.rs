//! Wire frames and typed commands.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use passkey_core::events::ProgressEvent;
use passkey_core::near::SignedTransactionEnvelope;
use passkey_core::{AccountId, WalletError};
use passkey_signer_worker::TransactionSigningRequest;

pub const PROTOCOL_VERSION: u32 = 1;

/// Commands the application may issue. Everything that touches credentials
/// or key material executes on the wallet side.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WalletRequest {
    SignTransactions {
        account_id: AccountId,
        transactions: Vec<TransactionSigningRequest>,
        #[serde(default)]
        execute_sequentially: bool,
    },
    RegisterUser {
        account_id: AccountId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        authenticator_options: Option<Value>,
    },
    SignNep413Message {
        account_id: AccountId,
        message: String,
        recipient: String,
        nonce_b64u: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        callback_url: Option<String>,
    },
    DeriveKeypair {
        account_id: AccountId,
    },
    RecoverKeypair {
        account_id: AccountId,
    },
    GetLastUser,
    StoreGet {
        namespace: String,
        key: String,
    },
    StorePut {
        namespace: String,
        key: String,
        value: Value,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WalletResponse {
    SignedTransactions {
        transactions: Vec<SignedTransactionEnvelope>,
        transaction_hashes: Vec<String>,
    },
    Registered {
        near_public_key: String,
        vrf_public_key_b64u: String,
    },
    SignedMessage {
        public_key: String,
        signature_b64: String,
    },
    Keypair {
        public_key: String,
    },
    LastUser {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        account_id: Option<AccountId>,
    },
    StoreValue {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
    },
    Ack,
}

/// One frame on the channel. Correlation ids tie responses and progress
/// events back to their request.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Frame {
    Connect {
        protocol_version: u32,
    },
    Ready {
        protocol_version: u32,
    },
    Request {
        id: u64,
        request: WalletRequest,
    },
    Response {
        id: u64,
        result: Result<WalletResponse, WalletError>,
    },
    Progress {
        id: u64,
        event: ProgressEvent,
    },
}
