//! Local key-value storage abstraction.
//!
//! The wallet frame persists users, authenticators, and encrypted key
//! material through this trait; adapters (IndexedDB-style stores, files,
//! memory) live outside the core. Access is serialized by the caller within
//! the wallet frame.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::account::AccountId;
use crate::crypto::EncryptedPrivateKey;
use crate::errors::WalletError;

pub mod namespaces {
    pub const USERS: &str = "users";
    pub const AUTHENTICATORS: &str = "authenticators";
    pub const NEAR_KEYS: &str = "near_keys";
    pub const PREFERENCES: &str = "preferences";
    pub const LAST_USER: &str = "last_user";
    pub const CONFIRMATION_CONFIG: &str = "confirmation_config";
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<serde_json::Value>, WalletError>;
    async fn put(
        &self,
        namespace: &str,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), WalletError>;
    async fn delete(&self, namespace: &str, key: &str) -> Result<(), WalletError>;
    async fn keys(&self, namespace: &str) -> Result<Vec<String>, WalletError>;
}

/// Typed read through any store.
pub async fn get_typed<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    namespace: &str,
    key: &str,
) -> Result<Option<T>, WalletError> {
    match store.get(namespace, key).await? {
        None => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| WalletError::internal(format!("corrupt record {}/{}: {}", namespace, key, e))),
    }
}

/// Typed write through any store.
pub async fn put_typed<T: Serialize>(
    store: &dyn KeyValueStore,
    namespace: &str,
    key: &str,
    value: &T,
) -> Result<(), WalletError> {
    let value = serde_json::to_value(value)
        .map_err(|e| WalletError::internal(format!("serialize {}/{}: {}", namespace, key, e)))?;
    store.put(namespace, key, value).await
}

/// In-memory store used by tests and as the wallet-frame default before an
/// adapter is attached.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, HashMap<String, serde_json::Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<serde_json::Value>, WalletError> {
        Ok(self
            .entries
            .read()
            .await
            .get(namespace)
            .and_then(|ns| ns.get(key))
            .cloned())
    }

    async fn put(
        &self,
        namespace: &str,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), WalletError> {
        self.entries
            .write()
            .await
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<(), WalletError> {
        if let Some(ns) = self.entries.write().await.get_mut(namespace) {
            ns.remove(key);
        }
        Ok(())
    }

    async fn keys(&self, namespace: &str) -> Result<Vec<String>, WalletError> {
        Ok(self
            .entries
            .read()
            .await
            .get(namespace)
            .map(|ns| ns.keys().cloned().collect())
            .unwrap_or_default())
    }
}

// === TYPED RECORDS ===

/// A registered user of this wallet instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub account_id: AccountId,
    pub near_public_key: String,
    pub device_number: u32,
    pub vrf_public_key_b64u: String,
    pub registered_at_ms: u64,
}

/// Contract-registered authenticator, keyed by (account, credential_id).
/// Immutable after first store; `device_number` is contract-assigned.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuthenticatorRecord {
    pub credential_id: String,
    pub credential_public_key_b64u: String,
    #[serde(default)]
    pub transports: Vec<String>,
    pub device_number: u32,
    pub vrf_public_keys: Vec<String>,
    pub registered_at_ms: u64,
}

pub fn authenticator_key(account_id: &AccountId, credential_id: &str) -> String {
    format!("{}:{}", account_id, credential_id)
}

/// Encrypted signing key at rest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EncryptedKeyRecord {
    pub account_id: AccountId,
    pub public_key: String,
    pub encrypted: EncryptedPrivateKey,
    pub created_at_ms: u64,
}

/// Encrypted VRF keypair at rest, optionally wrapped by the relay's Shamir
/// lock for remote-assisted unlock.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EncryptedVrfKeyRecord {
    pub account_id: AccountId,
    pub vrf_public_key_b64u: String,
    /// ChaCha20Poly1305 over the bincode keypair, nonce-prefixed, b64u.
    pub ciphertext_b64u: String,
    pub nonce_b64u: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_wrapped: Option<ServerWrappedKek>,
}

/// Server-locked KEK state for the Shamir 3-pass unlock path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerWrappedKek {
    /// KEK with only the server lock applied (`kek_s` in protocol terms).
    pub kek_s_b64u: String,
    /// Ciphertext of the VRF keypair under the plain KEK.
    pub ciphertext_b64u: String,
    /// Server key id the lock was applied with.
    pub key_id: String,
}
