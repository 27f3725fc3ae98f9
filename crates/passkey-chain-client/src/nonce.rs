//! Signing-context cache.
//!
//! The orchestrator needs `(next_nonce, block_hash, block_height)` for every
//! signing call. Fetching both views on every transaction would add two RPC
//! round-trips per signature, so the manager caches them with separate
//! freshness windows, refreshes opportunistically past the half-life, and
//! coalesces concurrent fetches onto one shared future.
//!
//! Invariants: at most one in-flight fetch; timers are cancelled on identity
//! changes and on clear; a fetch whose captured identity no longer matches
//! the current identity commits nothing.

use futures::future::{BoxFuture, FutureExt, Shared};
use log::warn;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

use passkey_core::clock::SharedClock;
use passkey_core::{AccountId, ErrorCode, WalletError, WalletResult};

use crate::rpc::{ChainRpc, Finality};

/// How long a fetched access-key nonce stays fresh.
pub const NONCE_FRESHNESS_MS: u64 = 20_000;
/// How long a fetched block stays fresh.
pub const BLOCK_FRESHNESS_MS: u64 = 10_000;
/// Age past which a still-served context is worth a warning.
pub const HARD_MAX_AGE_MS: u64 = 30_000;
/// Debounce window for [`NonceManager::prefetch`].
pub const PREFETCH_DEBOUNCE_MS: u64 = 150;

/// Everything a signing call needs from the chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SigningContext {
    pub near_public_key: String,
    /// Nonce currently stored on the access key.
    pub access_key_nonce: u64,
    /// `access_key_nonce + 1`: the nonce the next transaction must use.
    pub next_nonce: u64,
    /// base58 block hash transactions should reference.
    pub block_hash: String,
    pub block_height: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Identity {
    account_id: AccountId,
    public_key: String,
}

type SharedFetch = Shared<BoxFuture<'static, WalletResult<SigningContext>>>;

#[derive(Default)]
struct NonceState {
    /// Bumped on identity change and clear; an in-flight fetch captured under
    /// an older epoch discards its result.
    epoch: u64,
    identity: Option<Identity>,
    context: Option<SigningContext>,
    last_nonce_update_ms: u64,
    last_block_update_ms: u64,
    inflight: Option<SharedFetch>,
    background: Option<JoinHandle<()>>,
    prefetch: Option<JoinHandle<()>>,
}

impl NonceState {
    fn abort_timers(&mut self) {
        if let Some(handle) = self.background.take() {
            handle.abort();
        }
        if let Some(handle) = self.prefetch.take() {
            handle.abort();
        }
    }
}

#[derive(Clone)]
pub struct NonceManager {
    rpc: Arc<dyn ChainRpc>,
    clock: SharedClock,
    state: Arc<Mutex<NonceState>>,
}

impl NonceManager {
    pub fn new(rpc: Arc<dyn ChainRpc>, clock: SharedClock) -> Self {
        NonceManager {
            rpc,
            clock,
            state: Arc::new(Mutex::new(NonceState::default())),
        }
    }

    /// Point the cache at a signing identity. A change wipes the cache,
    /// cancels timers, and orphans any in-flight fetch.
    pub fn set_identity(&self, account_id: AccountId, public_key: String) {
        let identity = Identity {
            account_id,
            public_key,
        };
        let mut st = self.state.lock().unwrap();
        if st.identity.as_ref() == Some(&identity) {
            return;
        }
        st.identity = Some(identity);
        st.context = None;
        st.last_nonce_update_ms = 0;
        st.last_block_update_ms = 0;
        st.epoch += 1;
        st.inflight = None;
        st.abort_timers();
    }

    pub fn identity(&self) -> Option<(AccountId, String)> {
        self.state
            .lock()
            .unwrap()
            .identity
            .as_ref()
            .map(|i| (i.account_id.clone(), i.public_key.clone()))
    }

    pub fn cached_context(&self) -> Option<SigningContext> {
        self.state.lock().unwrap().context.clone()
    }

    /// Return the cached context iff both halves are fresh, scheduling a
    /// background refresh when either is past its half-life; otherwise fetch
    /// synchronously (joining any in-flight fetch).
    pub async fn get_context(&self) -> WalletResult<SigningContext> {
        let fetch = {
            let mut st = self.state.lock().unwrap();
            let identity = st.identity.clone().ok_or_else(|| {
                WalletError::new(ErrorCode::KeyNotFound, "no signing identity configured")
            })?;
            let now = self.clock.now_ms();
            let nonce_age = now.saturating_sub(st.last_nonce_update_ms);
            let block_age = now.saturating_sub(st.last_block_update_ms);

            if let Some(ctx) = st.context.clone() {
                if nonce_age < NONCE_FRESHNESS_MS && block_age < BLOCK_FRESHNESS_MS {
                    let past_half_life = nonce_age >= NONCE_FRESHNESS_MS / 2
                        || block_age >= BLOCK_FRESHNESS_MS / 2;
                    if past_half_life && st.background.is_none() {
                        let manager = self.clone();
                        st.background = Some(tokio::spawn(async move {
                            // Errors are swallowed; the cache stays usable
                            // until it ages out.
                            let _ = manager.refresh().await;
                            manager.state.lock().unwrap().background = None;
                        }));
                    }
                    return Ok(ctx);
                }
                if nonce_age >= HARD_MAX_AGE_MS {
                    warn!(
                        "signing context for {} is {}ms old; refetching",
                        identity.account_id, nonce_age
                    );
                }
            }

            self.start_fetch_locked(&mut st, identity)
        };
        fetch.await
    }

    /// Debounced warm-up: schedule a fetch ~150 ms out, coalescing with any
    /// fetch already in flight. Errors are ignored.
    pub fn prefetch(&self) {
        let mut st = self.state.lock().unwrap();
        if st.identity.is_none() || st.prefetch.is_some() {
            return;
        }
        let manager = self.clone();
        st.prefetch = Some(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(PREFETCH_DEBOUNCE_MS)).await;
            manager.state.lock().unwrap().prefetch = None;
            let _ = manager.get_context().await;
        }));
    }

    /// Wipe the cache and cancel timers (logout / teardown).
    pub fn clear_transaction_context(&self) {
        let mut st = self.state.lock().unwrap();
        st.identity = None;
        st.context = None;
        st.last_nonce_update_ms = 0;
        st.last_block_update_ms = 0;
        st.epoch += 1;
        st.inflight = None;
        st.abort_timers();
    }

    async fn refresh(&self) -> WalletResult<SigningContext> {
        let fetch = {
            let mut st = self.state.lock().unwrap();
            let identity = st.identity.clone().ok_or_else(|| {
                WalletError::new(ErrorCode::KeyNotFound, "no signing identity configured")
            })?;
            self.start_fetch_locked(&mut st, identity)
        };
        fetch.await
    }

    /// Join the in-flight fetch or start a new one. A part (access key or
    /// block) is re-requested when it is past half of its freshness window;
    /// the other half is carried over from the cached context.
    fn start_fetch_locked(&self, st: &mut NonceState, identity: Identity) -> SharedFetch {
        if let Some(inflight) = &st.inflight {
            return inflight.clone();
        }

        let now = self.clock.now_ms();
        let prev = st.context.clone();
        let refresh_nonce = prev.is_none()
            || now.saturating_sub(st.last_nonce_update_ms) >= NONCE_FRESHNESS_MS / 2;
        let refresh_block = prev.is_none()
            || now.saturating_sub(st.last_block_update_ms) >= BLOCK_FRESHNESS_MS / 2;

        let epoch = st.epoch;
        let rpc = self.rpc.clone();
        let clock = self.clock.clone();
        let state = self.state.clone();

        let fetch: SharedFetch = async move {
            let result =
                fetch_signing_context(&*rpc, &identity, prev, refresh_nonce, refresh_block).await;

            // Commit under the lock, but only if nothing invalidated this
            // fetch while it was in flight.
            let mut st = state.lock().unwrap();
            if st.epoch == epoch {
                st.inflight = None;
                if let Ok(ctx) = &result {
                    let now = clock.now_ms();
                    if refresh_nonce {
                        st.last_nonce_update_ms = now;
                    }
                    if refresh_block {
                        st.last_block_update_ms = now;
                    }
                    st.context = Some(ctx.clone());
                }
            }
            result
        }
        .boxed()
        .shared();

        st.inflight = Some(fetch.clone());
        fetch
    }
}

async fn fetch_signing_context(
    rpc: &dyn ChainRpc,
    identity: &Identity,
    prev: Option<SigningContext>,
    refresh_nonce: bool,
    refresh_block: bool,
) -> WalletResult<SigningContext> {
    let (access_key_nonce, block_hash, block_height) = match (refresh_nonce, refresh_block) {
        (true, true) => {
            let (key, block) = futures::try_join!(
                rpc.view_access_key(&identity.account_id, &identity.public_key),
                rpc.view_block(Finality::Final),
            )?;
            (key.nonce, block.hash, block.height)
        }
        (true, false) => {
            let key = rpc
                .view_access_key(&identity.account_id, &identity.public_key)
                .await?;
            let prev = prev.expect("block carried over requires a cached context");
            (key.nonce, prev.block_hash, prev.block_height)
        }
        (false, true) => {
            let block = rpc.view_block(Finality::Final).await?;
            let prev = prev.expect("nonce carried over requires a cached context");
            (prev.access_key_nonce, block.hash, block.height)
        }
        (false, false) => {
            let prev = prev.expect("no-op fetch requires a cached context");
            (prev.access_key_nonce, prev.block_hash, prev.block_height)
        }
    };

    Ok(SigningContext {
        near_public_key: identity.public_key.clone(),
        access_key_nonce,
        next_nonce: access_key_nonce + 1,
        block_hash,
        block_height,
    })
}
