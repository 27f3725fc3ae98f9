//! JSON-RPC 2.0 wrapper.
//!
//! Failure model: HTTP non-2xx → `RPC_HTTP`; missing or empty body →
//! `RPC_EMPTY`; a JSON-RPC `error` object → `RPC_ERROR` carrying the node's
//! code, message, and data.

use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

use passkey_core::{AccountId, ErrorCode, WalletError, WalletResult};

use crate::outcome::TxExecutionOutcome;
use crate::views::{AccessKeyList, AccessKeyView, AccountView, BlockInfo, CallFunctionResult};

pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Finality {
    Optimistic,
    #[serde(rename = "near-final")]
    NearFinal,
    Final,
}

/// `send_tx` wait levels accepted by the node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxWaitUntil {
    None,
    Included,
    IncludedFinal,
    Executed,
    Final,
    ExecutedOptimistic,
}

/// The five chain operations the wallet consumes. Mock implementations back
/// the test suites; [`HttpChainClient`] is the production one.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn view_account(&self, account_id: &AccountId) -> WalletResult<AccountView>;

    async fn view_access_key(
        &self,
        account_id: &AccountId,
        public_key: &str,
    ) -> WalletResult<AccessKeyView>;

    async fn view_access_key_list(&self, account_id: &AccountId) -> WalletResult<AccessKeyList>;

    async fn view_block(&self, finality: Finality) -> WalletResult<BlockInfo>;

    async fn call_function(
        &self,
        contract_id: &AccountId,
        method_name: &str,
        args: &Value,
    ) -> WalletResult<CallFunctionResult>;

    async fn send_tx(
        &self,
        signed_tx_base64: &str,
        wait_until: TxWaitUntil,
    ) -> WalletResult<TxExecutionOutcome>;
}

#[derive(Clone)]
pub struct HttpChainClient {
    http: reqwest::Client,
    rpc_url: Url,
}

impl HttpChainClient {
    pub fn new(rpc_url: Url) -> WalletResult<Self> {
        Self::with_timeout(rpc_url, DEFAULT_RPC_TIMEOUT)
    }

    pub fn with_timeout(rpc_url: Url, timeout: Duration) -> WalletResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WalletError::internal(format!("http client build failed: {}", e)))?;
        Ok(HttpChainClient { http, rpc_url })
    }

    async fn request(&self, method: &str, params: Value) -> WalletResult<Value> {
        debug!("rpc {} -> {}", method, self.rpc_url);
        let body = json!({
            "jsonrpc": "2.0",
            "id": "passkey-wallet",
            "method": method,
            "params": params,
        });

        let response = self
            .http
            .post(self.rpc_url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| WalletError::new(ErrorCode::RpcHttp, format!("rpc send failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WalletError::new(
                ErrorCode::RpcHttp,
                format!("rpc http status {}", status),
            ));
        }

        let text = response.text().await.map_err(|e| {
            WalletError::new(ErrorCode::RpcHttp, format!("rpc body read failed: {}", e))
        })?;
        if text.trim().is_empty() {
            return Err(WalletError::new(ErrorCode::RpcEmpty, "empty rpc response"));
        }

        let parsed: Value = serde_json::from_str(&text).map_err(|e| {
            WalletError::new(ErrorCode::RpcError, format!("rpc response not JSON: {}", e))
        })?;

        if let Some(error) = parsed.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .or_else(|| error.get("name").and_then(Value::as_str))
                .unwrap_or("unknown rpc error");
            let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
            return Err(WalletError::new(
                ErrorCode::RpcError,
                format!("rpc error {}: {}", code, message),
            )
            .with_details(error.clone()));
        }

        parsed
            .get("result")
            .cloned()
            .ok_or_else(|| WalletError::new(ErrorCode::RpcEmpty, "rpc response missing result"))
    }

    fn parse<T: serde::de::DeserializeOwned>(what: &str, value: Value) -> WalletResult<T> {
        serde_json::from_value(value).map_err(|e| {
            WalletError::new(ErrorCode::RpcError, format!("{} decode failed: {}", what, e))
        })
    }
}

#[async_trait]
impl ChainRpc for HttpChainClient {
    async fn view_account(&self, account_id: &AccountId) -> WalletResult<AccountView> {
        let result = self
            .request(
                "query",
                json!({
                    "request_type": "view_account",
                    "finality": "final",
                    "account_id": account_id,
                }),
            )
            .await?;
        Self::parse("view_account", result)
    }

    async fn view_access_key(
        &self,
        account_id: &AccountId,
        public_key: &str,
    ) -> WalletResult<AccessKeyView> {
        let result = self
            .request(
                "query",
                json!({
                    "request_type": "view_access_key",
                    "finality": "final",
                    "account_id": account_id,
                    "public_key": public_key,
                }),
            )
            .await?;
        Self::parse("view_access_key", result)
    }

    async fn view_access_key_list(&self, account_id: &AccountId) -> WalletResult<AccessKeyList> {
        let result = self
            .request(
                "query",
                json!({
                    "request_type": "view_access_key_list",
                    "finality": "final",
                    "account_id": account_id,
                }),
            )
            .await?;
        Self::parse("view_access_key_list", result)
    }

    async fn view_block(&self, finality: Finality) -> WalletResult<BlockInfo> {
        let result = self
            .request("block", json!({ "finality": finality }))
            .await?;
        let header = result
            .get("header")
            .cloned()
            .ok_or_else(|| WalletError::new(ErrorCode::RpcError, "block response missing header"))?;
        Self::parse("block header", header)
    }

    async fn call_function(
        &self,
        contract_id: &AccountId,
        method_name: &str,
        args: &Value,
    ) -> WalletResult<CallFunctionResult> {
        let result = self
            .request(
                "query",
                json!({
                    "request_type": "call_function",
                    "finality": "final",
                    "account_id": contract_id,
                    "method_name": method_name,
                    "args_base64": Base64::encode_string(args.to_string().as_bytes()),
                }),
            )
            .await?;

        // A view that panics surfaces as an `error` string inside `result`.
        if let Some(error) = result.get("error").and_then(Value::as_str) {
            return Err(
                WalletError::new(ErrorCode::RpcError, format!("contract view error: {}", error)),
            );
        }

        let raw: Vec<u8> = result
            .get("result")
            .and_then(Value::as_array)
            .map(|bytes| {
                bytes
                    .iter()
                    .map(|b| b.as_u64().unwrap_or(0) as u8)
                    .collect()
            })
            .ok_or_else(|| {
                WalletError::new(ErrorCode::RpcError, "call_function missing result bytes")
            })?;
        let logs = result
            .get("logs")
            .and_then(Value::as_array)
            .map(|logs| {
                logs.iter()
                    .filter_map(|l| l.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        Ok(CallFunctionResult::from_raw(raw, logs))
    }

    async fn send_tx(
        &self,
        signed_tx_base64: &str,
        wait_until: TxWaitUntil,
    ) -> WalletResult<TxExecutionOutcome> {
        let result = self
            .request(
                "send_tx",
                json!({
                    "signed_tx_base64": signed_tx_base64,
                    "wait_until": wait_until,
                }),
            )
            .await?;
        Self::parse("send_tx outcome", result)
    }
}
