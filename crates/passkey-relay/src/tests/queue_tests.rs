use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use passkey_core::errors::{ErrorCode, WalletError};

use crate::queue::TransactionQueue;

#[tokio::test]
async fn concurrent_work_is_serialized() {
    let queue = Arc::new(TransactionQueue::new());
    let active = Arc::new(AtomicUsize::new(0));
    let max_active = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let queue = queue.clone();
        let active = active.clone();
        let max_active = max_active.clone();
        handles.push(tokio::spawn(async move {
            queue
                .run(async {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    max_active.fetch_max(now, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, WalletError>(())
                })
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(max_active.load(Ordering::SeqCst), 1, "no overlap allowed");
    let stats = queue.stats();
    assert_eq!(stats.completed, 16);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.pending, 0);
}

#[tokio::test]
async fn failures_count_separately() {
    let queue = TransactionQueue::new();
    let ok: Result<(), WalletError> = queue.run(async { Ok(()) }).await;
    assert!(ok.is_ok());

    let err: Result<(), WalletError> = queue
        .run(async { Err(WalletError::new(ErrorCode::TxFailure, "boom")) })
        .await;
    assert!(err.is_err());

    let stats = queue.stats();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 1);
}
