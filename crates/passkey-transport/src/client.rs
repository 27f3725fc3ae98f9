//! Application-side client.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::debug;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use passkey_core::errors::{ErrorCode, WalletError, WalletResult};
use passkey_core::events::ProgressSender;

use crate::channel::MessageChannel;
use crate::protocol::{Frame, WalletRequest, WalletResponse, PROTOCOL_VERSION};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(8);

#[derive(Clone, Debug)]
pub struct TransportConfig {
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<WalletResponse, WalletError>>>>>;
type ProgressMap = Arc<Mutex<HashMap<u64, ProgressSender>>>;

#[derive(Debug)]
pub struct WalletClient {
    tx: mpsc::UnboundedSender<Frame>,
    pending: PendingMap,
    progress: ProgressMap,
    next_id: AtomicU64,
    request_timeout: Duration,
}

impl WalletClient {
    /// Perform the CONNECT / READY handshake over a one-time channel.
    pub async fn connect(channel: MessageChannel, config: TransportConfig) -> WalletResult<Self> {
        let MessageChannel { tx, rx } = channel;
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let progress: ProgressMap = Arc::new(Mutex::new(HashMap::new()));
        let (ready_tx, ready_rx) = oneshot::channel();

        tokio::spawn(read_loop(rx, pending.clone(), progress.clone(), ready_tx));

        tx.send(Frame::Connect {
            protocol_version: PROTOCOL_VERSION,
        })
        .map_err(|_| not_ready("channel closed before CONNECT"))?;

        let ready = tokio::time::timeout(config.connect_timeout, ready_rx)
            .await
            .map_err(|_| not_ready("wallet did not answer CONNECT in time"))?
            .map_err(|_| not_ready("channel closed during handshake"))?;
        debug!("wallet ready, protocol version {}", ready);

        // Seed correlation ids from randomness: ids must not be predictable
        // across sessions.
        let mut seed = [0u8; 8];
        getrandom::getrandom(&mut seed)
            .map_err(|e| WalletError::internal(format!("id seed failed: {}", e)))?;

        Ok(WalletClient {
            tx,
            pending,
            progress,
            next_id: AtomicU64::new(u64::from_le_bytes(seed)),
            request_timeout: config.request_timeout,
        })
    }

    pub async fn request(&self, request: WalletRequest) -> WalletResult<WalletResponse> {
        self.request_with_options(request, None, &CancellationToken::new())
            .await
    }

    /// Issue a request; progress frames for it are forwarded to `progress`.
    /// Cancelling removes the pending entry and rejects the waiter; a late
    /// response is discarded.
    pub async fn request_with_options(
        &self,
        request: WalletRequest,
        progress: Option<ProgressSender>,
        cancel: &CancellationToken,
    ) -> WalletResult<WalletResponse> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id, reply_tx);
        if let Some(progress) = progress {
            self.progress.lock().unwrap().insert(id, progress);
        }

        let outcome = if self.tx.send(Frame::Request { id, request }).is_err() {
            Err(not_ready("wallet channel closed"))
        } else {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(WalletError::new(
                    ErrorCode::Cancelled,
                    "request cancelled by caller",
                )),
                result = tokio::time::timeout(self.request_timeout, reply_rx) => match result {
                    Err(_) => Err(WalletError::new(
                        ErrorCode::IpcTimeout,
                        "wallet did not respond in time",
                    )),
                    Ok(Err(_)) => Err(not_ready("wallet channel closed mid-request")),
                    Ok(Ok(result)) => result,
                },
            }
        };

        self.pending.lock().unwrap().remove(&id);
        self.progress.lock().unwrap().remove(&id);
        outcome
    }
}

async fn read_loop(
    mut rx: mpsc::UnboundedReceiver<Frame>,
    pending: PendingMap,
    progress: ProgressMap,
    ready_tx: oneshot::Sender<u32>,
) {
    let mut ready_tx = Some(ready_tx);
    while let Some(frame) = rx.recv().await {
        match frame {
            Frame::Ready { protocol_version } => {
                if let Some(ready) = ready_tx.take() {
                    let _ = ready.send(protocol_version);
                }
            }
            Frame::Response { id, result } => {
                // Cancelled or timed-out requests have already removed their
                // entry; such results are dropped on the floor.
                if let Some(waiter) = pending.lock().unwrap().remove(&id) {
                    let _ = waiter.send(result);
                }
            }
            Frame::Progress { id, event } => {
                if let Some(sender) = progress.lock().unwrap().get(&id) {
                    let _ = sender.send(event);
                }
            }
            Frame::Connect { .. } | Frame::Request { .. } => {
                // Host-to-client channel never carries these.
            }
        }
    }
}

fn not_ready(message: &str) -> WalletError {
    WalletError::new(ErrorCode::IpcNotReady, message)
}
