//! Read-only projections of chain state returned by the RPC node.

use serde::{Deserialize, Serialize};

use passkey_core::near::AccessKeyPermission;
use passkey_core::WalletError;

/// `query(view_account)` result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccountView {
    pub amount: String,
    #[serde(default)]
    pub locked: String,
    #[serde(default)]
    pub code_hash: String,
    #[serde(default)]
    pub storage_usage: u64,
    #[serde(default)]
    pub block_height: u64,
    #[serde(default)]
    pub block_hash: String,
}

/// `query(view_access_key)` result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccessKeyView {
    pub nonce: u64,
    #[serde(deserialize_with = "passkey_core::near::deserialize_permission_compat")]
    pub permission: AccessKeyPermission,
    #[serde(default)]
    pub block_height: u64,
    #[serde(default)]
    pub block_hash: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccessKeyInfo {
    pub public_key: String,
    pub access_key: AccessKeyView,
}

/// `query(view_access_key_list)` result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccessKeyList {
    pub keys: Vec<AccessKeyInfo>,
}

/// The slice of a `block` response the wallet needs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub height: u64,
    /// base58-encoded 32-byte hash.
    pub hash: String,
    #[serde(default)]
    pub timestamp: u64,
}

impl BlockInfo {
    pub fn hash_bytes(&self) -> Result<Vec<u8>, WalletError> {
        bs58::decode(&self.hash)
            .into_vec()
            .map_err(|e| WalletError::input_invalid(format!("block hash base58 error: {}", e)))
    }
}

/// `query(call_function)` result: raw bytes plus their decoded form.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CallFunctionResult {
    pub raw: Vec<u8>,
    pub logs: Vec<String>,
    /// UTF-8 → JSON decode of `raw`; non-JSON payloads come back as a string
    /// with surrounding quotes trimmed.
    pub value: serde_json::Value,
}

impl CallFunctionResult {
    pub fn from_raw(raw: Vec<u8>, logs: Vec<String>) -> Self {
        let value = decode_view_result(&raw);
        CallFunctionResult { raw, logs, value }
    }
}

/// Contract views return byte arrays; most are JSON. Decode to UTF-8 and
/// parse, falling back to the verbatim text (quotes trimmed) when it is not.
pub fn decode_view_result(raw: &[u8]) -> serde_json::Value {
    match std::str::from_utf8(raw) {
        Ok(text) => match serde_json::from_str::<serde_json::Value>(text) {
            Ok(value) => value,
            Err(_) => serde_json::Value::String(text.trim_matches('"').to_string()),
        },
        Err(_) => serde_json::Value::Null,
    }
}
