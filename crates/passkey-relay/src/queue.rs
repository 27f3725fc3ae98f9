//! Relay transaction queue.
//!
//! Every build-and-broadcast that spends the relay account runs through this
//! queue, so its nonces stay contiguous no matter how many HTTP requests are
//! in flight.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use passkey_core::errors::WalletResult;

#[derive(Default)]
pub struct TransactionQueue {
    serialize: Mutex<()>,
    pending: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: usize,
    pub completed: usize,
    pub failed: usize,
}

impl TransactionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` exclusively. Counters reflect the outcome.
    pub async fn run<T, F>(&self, work: F) -> WalletResult<T>
    where
        F: Future<Output = WalletResult<T>>,
    {
        self.pending.fetch_add(1, Ordering::SeqCst);
        let _guard = self.serialize.lock().await;
        let result = work.await;
        self.pending.fetch_sub(1, Ordering::SeqCst);
        match &result {
            Ok(_) => self.completed.fetch_add(1, Ordering::SeqCst),
            Err(_) => self.failed.fetch_add(1, Ordering::SeqCst),
        };
        result
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            pending: self.pending.load(Ordering::SeqCst),
            completed: self.completed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }
}
