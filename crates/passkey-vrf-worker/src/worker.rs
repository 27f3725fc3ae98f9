//! The worker actor and its handle.

use log::warn;
use tokio::sync::{mpsc, oneshot};

use passkey_core::clock::SharedClock;
use passkey_core::errors::{ErrorCode, WalletError, WalletResult};
use passkey_core::shamir3pass::Shamir3Pass;
use passkey_core::store::ServerWrappedKek;
use passkey_core::vrf::{VrfChallenge, VrfInputData};
use passkey_core::AccountId;

use crate::manager::{VrfKeyManager, VRF_SESSION_TTL_MS};
use crate::shamir_client::{
    unwrap_keypair_with_server_lock, wrap_keypair_with_server_lock, ServerLockTransport,
};
use crate::types::{BootstrapVrfResult, DeterministicVrfResult, EncryptedVrfKeypair, VrfStatus};

const REQUEST_CHANNEL_CAPACITY: usize = 32;

pub struct VrfWorkerConfig {
    pub clock: SharedClock,
    /// Deployment prime; `None` uses the built-in default.
    pub shamir_p_b64u: Option<String>,
    /// Transport to the relay's apply/remove lock routes, when the
    /// server-assisted unlock path is enabled.
    pub lock_transport: Option<Box<dyn ServerLockTransport>>,
    pub session_ttl_ms: u64,
}

impl VrfWorkerConfig {
    pub fn new(clock: SharedClock) -> Self {
        VrfWorkerConfig {
            clock,
            shamir_p_b64u: None,
            lock_transport: None,
            session_ttl_ms: VRF_SESSION_TTL_MS,
        }
    }
}

enum VrfRequest {
    Unlock {
        account_id: AccountId,
        encrypted: EncryptedVrfKeypair,
        prf_vrf_salt_b64u: String,
        reply: oneshot::Sender<WalletResult<String>>,
    },
    DeriveDeterministic {
        account_id: AccountId,
        prf_vrf_salt_b64u: String,
        input: Option<VrfInputData>,
        reply: oneshot::Sender<WalletResult<DeterministicVrfResult>>,
    },
    GenerateBootstrap {
        account_id: AccountId,
        input: Option<VrfInputData>,
        reply: oneshot::Sender<WalletResult<BootstrapVrfResult>>,
    },
    Challenge {
        input: VrfInputData,
        reply: oneshot::Sender<WalletResult<VrfChallenge>>,
    },
    IsActive {
        account_id: Option<AccountId>,
        reply: oneshot::Sender<VrfStatus>,
    },
    WrapWithServerLock {
        reply: oneshot::Sender<WalletResult<ServerWrappedKek>>,
    },
    UnlockWithServerLock {
        account_id: AccountId,
        wrapped: ServerWrappedKek,
        reply: oneshot::Sender<WalletResult<String>>,
    },
    Lock {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable handle to the worker task.
#[derive(Clone)]
pub struct VrfWorkerHandle {
    tx: mpsc::Sender<VrfRequest>,
}

impl VrfWorkerHandle {
    /// Spawn the worker task and return its handle.
    pub fn spawn(config: VrfWorkerConfig) -> Self {
        let (tx, rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
        tokio::spawn(run_worker(config, rx));
        VrfWorkerHandle { tx }
    }

    pub async fn unlock(
        &self,
        account_id: AccountId,
        encrypted: EncryptedVrfKeypair,
        prf_vrf_salt_b64u: String,
    ) -> WalletResult<String> {
        self.call(|reply| VrfRequest::Unlock {
            account_id,
            encrypted,
            prf_vrf_salt_b64u,
            reply,
        })
        .await?
    }

    pub async fn derive_deterministic(
        &self,
        account_id: AccountId,
        prf_vrf_salt_b64u: String,
        input: Option<VrfInputData>,
    ) -> WalletResult<DeterministicVrfResult> {
        self.call(|reply| VrfRequest::DeriveDeterministic {
            account_id,
            prf_vrf_salt_b64u,
            input,
            reply,
        })
        .await?
    }

    pub async fn generate_bootstrap(
        &self,
        account_id: AccountId,
        input: Option<VrfInputData>,
    ) -> WalletResult<BootstrapVrfResult> {
        self.call(|reply| VrfRequest::GenerateBootstrap {
            account_id,
            input,
            reply,
        })
        .await?
    }

    pub async fn challenge(&self, input: VrfInputData) -> WalletResult<VrfChallenge> {
        self.call(|reply| VrfRequest::Challenge { input, reply })
            .await?
    }

    pub async fn is_active(&self, account_id: Option<AccountId>) -> WalletResult<VrfStatus> {
        self.call(|reply| VrfRequest::IsActive { account_id, reply })
            .await
    }

    /// Wrap the live session keypair under the relay's Shamir lock.
    pub async fn wrap_with_server_lock(&self) -> WalletResult<ServerWrappedKek> {
        self.call(|reply| VrfRequest::WrapWithServerLock { reply })
            .await?
    }

    /// Open a server-wrapped keypair and install it as the session.
    pub async fn unlock_with_server_lock(
        &self,
        account_id: AccountId,
        wrapped: ServerWrappedKek,
    ) -> WalletResult<String> {
        self.call(|reply| VrfRequest::UnlockWithServerLock {
            account_id,
            wrapped,
            reply,
        })
        .await?
    }

    pub async fn lock(&self) -> WalletResult<()> {
        self.call(|reply| VrfRequest::Lock { reply }).await
    }

    /// Logout is a lock plus whatever the caller clears elsewhere; the worker
    /// holds no other per-user state.
    pub async fn clear_on_logout(&self) -> WalletResult<()> {
        self.lock().await
    }

    async fn call<T>(
        &self,
        make_request: impl FnOnce(oneshot::Sender<T>) -> VrfRequest,
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
    WalletError::new(ErrorCode::IpcNotReady, "VRF worker is not running")
}

async fn run_worker(config: VrfWorkerConfig, mut rx: mpsc::Receiver<VrfRequest>) {
    let shamir = match &config.shamir_p_b64u {
        Some(p) => match Shamir3Pass::new(p) {
            Ok(shamir) => shamir,
            Err(e) => {
                warn!("invalid configured Shamir prime ({}); using default", e);
                Shamir3Pass::new_default()
            }
        },
        None => Shamir3Pass::new_default(),
    };
    let mut manager = VrfKeyManager::new(config.clock, shamir, config.session_ttl_ms);
    let lock_transport = config.lock_transport;

    while let Some(request) = rx.recv().await {
        match request {
            VrfRequest::Unlock {
                account_id,
                encrypted,
                prf_vrf_salt_b64u,
                reply,
            } => {
                let _ = reply.send(manager.unlock(account_id, &encrypted, &prf_vrf_salt_b64u));
            }
            VrfRequest::DeriveDeterministic {
                account_id,
                prf_vrf_salt_b64u,
                input,
                reply,
            } => {
                let _ = reply.send(manager.derive_deterministic(
                    account_id,
                    &prf_vrf_salt_b64u,
                    input,
                ));
            }
            VrfRequest::GenerateBootstrap {
                account_id,
                input,
                reply,
            } => {
                let _ = reply.send(manager.generate_bootstrap(account_id, input));
            }
            VrfRequest::Challenge { input, reply } => {
                let _ = reply.send(manager.challenge(&input));
            }
            VrfRequest::IsActive { account_id, reply } => {
                let _ = reply.send(manager.status(account_id.as_ref()));
            }
            VrfRequest::WrapWithServerLock { reply } => {
                let result = match &lock_transport {
                    None => Err(WalletError::new(
                        ErrorCode::ShamirNotInit,
                        "no lock service configured",
                    )),
                    Some(transport) => {
                        let shamir = manager.shamir().clone();
                        match manager.session_keypair() {
                            Err(e) => Err(e),
                            Ok(keypair) => {
                                wrap_keypair_with_server_lock(&shamir, transport.as_ref(), keypair)
                                    .await
                            }
                        }
                    }
                };
                let _ = reply.send(result);
            }
            VrfRequest::UnlockWithServerLock {
                account_id,
                wrapped,
                reply,
            } => {
                let result = match &lock_transport {
                    None => Err(WalletError::new(
                        ErrorCode::ShamirNotInit,
                        "no lock service configured",
                    )),
                    Some(transport) => {
                        let shamir = manager.shamir().clone();
                        match unwrap_keypair_with_server_lock(&shamir, transport.as_ref(), &wrapped)
                            .await
                        {
                            Ok(keypair) => manager.load_keypair(account_id, keypair),
                            Err(e) => Err(e),
                        }
                    }
                };
                let _ = reply.send(result);
            }
            VrfRequest::Lock { reply } => {
                manager.lock();
                let _ = reply.send(());
            }
        }
    }
}
