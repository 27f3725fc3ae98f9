//! Shamir 3-pass server-lock service.
//!
//! One active keypair plus a set of grace keypairs, each addressed by
//! `key_id = b64u(sha256(e_s))`. Lock and unlock are pure modular
//! exponentiations and mutate nothing; rotation swaps the active keypair
//! under an exclusive lock and persists the grace list before returning.

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::{info, warn};

use passkey_core::errors::{ErrorCode, WalletError, WalletResult};
use passkey_core::shamir3pass::{
    decode_biguint_b64u, encode_biguint_b64u, key_id_for_exponent, Shamir3Pass,
};

#[derive(Clone)]
pub struct ServerKeypair {
    pub key_id: String,
    pub e_s: BigUint,
    pub d_s: BigUint,
}

impl ServerKeypair {
    pub fn from_b64u(e_s_b64u: &str, d_s_b64u: &str) -> WalletResult<Self> {
        let e_s = decode_biguint_b64u(e_s_b64u)?;
        let d_s = decode_biguint_b64u(d_s_b64u)?;
        Ok(ServerKeypair {
            key_id: key_id_for_exponent(&e_s),
            e_s,
            d_s,
        })
    }

    pub fn generate(shamir: &Shamir3Pass) -> WalletResult<Self> {
        let keys = shamir
            .generate_lock_keys()
            .map_err(|e| WalletError::internal(e.to_string()))?;
        Ok(ServerKeypair {
            key_id: key_id_for_exponent(&keys.e),
            e_s: keys.e,
            d_s: keys.d,
        })
    }
}

impl std::fmt::Debug for ServerKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Exponents are secrets; only the id is printable.
        f.debug_struct("ServerKeypair")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

/// On-disk form of a grace key.
#[derive(Debug, Serialize, Deserialize)]
struct GraceKeyFileEntry {
    key_id: String,
    e_s_b64u: String,
    d_s_b64u: String,
}

#[derive(Clone)]
struct KeyState {
    current: ServerKeypair,
    grace: Vec<ServerKeypair>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyInfo {
    pub current_key_id: String,
    pub p_b64u: String,
    pub grace_key_ids: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RotationResult {
    pub new_key_id: String,
    pub previous_key_id: String,
    pub grace_key_ids: Vec<String>,
}

pub struct ShamirKeyService {
    shamir: Shamir3Pass,
    state: RwLock<KeyState>,
    grace_file: Option<PathBuf>,
    max_grace_keys: usize,
}

impl ShamirKeyService {
    pub fn new(
        shamir: Shamir3Pass,
        current: ServerKeypair,
        grace_file: Option<PathBuf>,
        max_grace_keys: usize,
    ) -> Self {
        ShamirKeyService {
            shamir,
            state: RwLock::new(KeyState {
                current,
                grace: Vec::new(),
            }),
            grace_file,
            max_grace_keys,
        }
    }

    pub fn shamir(&self) -> &Shamir3Pass {
        &self.shamir
    }

    /// Load persisted grace keys. Idempotent: entries whose key id is already
    /// known (including the current key) are skipped.
    pub async fn load_grace_keys(&self) -> WalletResult<usize> {
        let Some(path) = &self.grace_file else {
            return Ok(0);
        };
        if !path.exists() {
            return Ok(0);
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| WalletError::internal(format!("grace file read failed: {}", e)))?;
        let entries: Vec<GraceKeyFileEntry> = serde_json::from_str(&raw)
            .map_err(|e| WalletError::internal(format!("grace file parse failed: {}", e)))?;

        let mut state = self.state.write().await;
        let mut loaded = 0;
        for entry in entries {
            let keypair = ServerKeypair::from_b64u(&entry.e_s_b64u, &entry.d_s_b64u)?;
            if keypair.key_id != entry.key_id {
                warn!(key_id = %entry.key_id, "grace entry id does not match its exponent; skipping");
                continue;
            }
            let known = state.current.key_id == keypair.key_id
                || state.grace.iter().any(|g| g.key_id == keypair.key_id);
            if known {
                continue;
            }
            state.grace.push(keypair);
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Apply the server lock with the active key. Pure compute.
    pub async fn apply_server_lock(&self, kek_c_b64u: &str) -> WalletResult<(String, String)> {
        let kek_c = decode_biguint_b64u(kek_c_b64u)?;
        let state = self.state.read().await;
        let kek_cs = self
            .shamir
            .add_lock(&kek_c, &state.current.e_s)
            .map_err(|e| WalletError::input_invalid(e.to_string()))?;
        Ok((encode_biguint_b64u(&kek_cs), state.current.key_id.clone()))
    }

    /// Remove a server lock by key id: the active key, or any grace key;
    /// anything else is `UNKNOWN_KEY`. Pure compute.
    pub async fn remove_server_lock(
        &self,
        kek_cs_b64u: &str,
        key_id: &str,
    ) -> WalletResult<String> {
        let kek_cs = decode_biguint_b64u(kek_cs_b64u)?;
        let state = self.state.read().await;
        let keypair = if state.current.key_id == key_id {
            &state.current
        } else {
            state
                .grace
                .iter()
                .find(|g| g.key_id == key_id)
                .ok_or_else(|| {
                    WalletError::new(
                        ErrorCode::UnknownKey,
                        format!("no server key with id {}", key_id),
                    )
                })?
        };
        let kek_c = self
            .shamir
            .remove_lock(&kek_cs, &keypair.d_s)
            .map_err(|e| WalletError::input_invalid(e.to_string()))?;
        Ok(encode_biguint_b64u(&kek_c))
    }

    /// Install a fresh active keypair, optionally demoting the previous one
    /// to the grace set. Exclusive over the keystore for the swap.
    pub async fn rotate(
        &self,
        keep_current_in_grace: bool,
        persist_grace: bool,
    ) -> WalletResult<RotationResult> {
        let fresh = ServerKeypair::generate(&self.shamir)?;
        let mut state = self.state.write().await;
        let previous = std::mem::replace(&mut state.current, fresh);
        let previous_key_id = previous.key_id.clone();

        // Copy-on-write: build the new grace list, then swap it in.
        let mut grace = state.grace.clone();
        if keep_current_in_grace {
            grace.insert(0, previous);
        }
        grace.truncate(self.max_grace_keys);
        state.grace = grace;

        let result = RotationResult {
            new_key_id: state.current.key_id.clone(),
            previous_key_id,
            grace_key_ids: state.grace.iter().map(|g| g.key_id.clone()).collect(),
        };
        if persist_grace {
            self.persist_locked(&state)?;
        }
        info!(new_key_id = %result.new_key_id, "rotated shamir server key");
        Ok(result)
    }

    pub async fn add_grace(&self, e_s_b64u: &str, d_s_b64u: &str) -> WalletResult<String> {
        let keypair = ServerKeypair::from_b64u(e_s_b64u, d_s_b64u)?;
        let key_id = keypair.key_id.clone();
        let mut state = self.state.write().await;
        if !state.grace.iter().any(|g| g.key_id == key_id) {
            state.grace.push(keypair);
            self.persist_locked(&state)?;
        }
        Ok(key_id)
    }

    pub async fn remove_grace(&self, key_id: &str) -> WalletResult<bool> {
        let mut state = self.state.write().await;
        let before = state.grace.len();
        state.grace.retain(|g| g.key_id != key_id);
        let removed = state.grace.len() != before;
        if removed {
            self.persist_locked(&state)?;
        }
        Ok(removed)
    }

    pub async fn list_grace(&self) -> Vec<String> {
        self.state
            .read()
            .await
            .grace
            .iter()
            .map(|g| g.key_id.clone())
            .collect()
    }

    pub async fn key_info(&self) -> KeyInfo {
        let state = self.state.read().await;
        KeyInfo {
            current_key_id: state.current.key_id.clone(),
            p_b64u: self.shamir.p_b64u(),
            grace_key_ids: state.grace.iter().map(|g| g.key_id.clone()).collect(),
        }
    }

    fn persist_locked(&self, state: &KeyState) -> WalletResult<()> {
        let Some(path) = &self.grace_file else {
            return Ok(());
        };
        let entries: Vec<GraceKeyFileEntry> = state
            .grace
            .iter()
            .map(|g| GraceKeyFileEntry {
                key_id: g.key_id.clone(),
                e_s_b64u: encode_biguint_b64u(&g.e_s),
                d_s_b64u: encode_biguint_b64u(&g.d_s),
            })
            .collect();
        let body = serde_json::to_string_pretty(&entries)
            .map_err(|e| WalletError::internal(format!("grace serialize failed: {}", e)))?;
        std::fs::write(path, body)
            .map_err(|e| WalletError::internal(format!("grace file write failed: {}", e)))
    }
}

/// Rotate on a fixed interval, pruning grace keys past the configured
/// maximum. Errors are logged and the cron keeps going.
pub fn spawn_rotation_cron(
    service: std::sync::Arc<ShamirKeyService>,
    interval_minutes: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let period = std::time::Duration::from_secs(interval_minutes * 60);
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await; // the first tick fires immediately; skip it
        loop {
            ticker.tick().await;
            if let Err(e) = service.rotate(true, true).await {
                warn!("scheduled key rotation failed: {}", e);
            }
        }
    })
}
