//! Wallet-side host loop.

use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use tokio::task::JoinHandle;

use passkey_core::errors::WalletResult;
use passkey_core::events::{progress_channel, ProgressSender};

use crate::channel::MessageChannel;
use crate::protocol::{Frame, WalletRequest, WalletResponse, PROTOCOL_VERSION};

/// What the wallet frame plugs into the host loop. Implementations dispatch
/// to the orchestrator and workers.
#[async_trait]
pub trait WalletService: Send + Sync {
    async fn handle(
        &self,
        request: WalletRequest,
        progress: Option<ProgressSender>,
    ) -> WalletResult<WalletResponse>;
}

/// Serve one channel until it closes. Each request runs as its own task so a
/// slow ceremony does not block unrelated requests.
pub fn spawn_host(channel: MessageChannel, service: Arc<dyn WalletService>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let MessageChannel { tx, mut rx } = channel;
        while let Some(frame) = rx.recv().await {
            match frame {
                Frame::Connect { protocol_version } => {
                    debug!("application connected (protocol {})", protocol_version);
                    let _ = tx.send(Frame::Ready {
                        protocol_version: PROTOCOL_VERSION,
                    });
                }
                Frame::Request { id, request } => {
                    let tx = tx.clone();
                    let service = service.clone();
                    tokio::spawn(async move {
                        // Bridge progress events into the channel as frames.
                        let (progress_tx, mut progress_rx) = progress_channel();
                        let forward = {
                            let tx = tx.clone();
                            tokio::spawn(async move {
                                while let Some(event) = progress_rx.recv().await {
                                    let _ = tx.send(Frame::Progress { id, event });
                                }
                            })
                        };

                        let result = service.handle(request, Some(progress_tx)).await;
                        forward.await.ok();
                        let _ = tx.send(Frame::Response { id, result });
                    });
                }
                Frame::Ready { .. } | Frame::Response { .. } | Frame::Progress { .. } => {
                    // Client-to-host channel never carries these.
                }
            }
        }
    })
}
