use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use passkey_core::actions::ActionParams;
use passkey_core::errors::ErrorCode;
use passkey_core::events::{progress_channel, ActionPhase, ProgressReceiver};
use passkey_core::store::{self, AuthenticatorRecord, KeyValueStore, UserRecord};
use passkey_core::vrf::vrf_verify;
use passkey_core::AccountId;
use passkey_signer_worker::TransactionSigningRequest;

use crate::orchestrator::{CallHooks, ExecuteOptions};
use crate::tests::fixtures::{account, test_wallet};

fn transfer(receiver: &str, amount: &str) -> TransactionSigningRequest {
    TransactionSigningRequest {
        receiver_id: AccountId::new(receiver).unwrap(),
        actions: vec![ActionParams::Transfer {
            deposit: amount.to_string(),
        }],
    }
}

fn drain_phases(rx: &mut ProgressReceiver) -> Vec<ActionPhase> {
    let mut phases = Vec::new();
    while let Ok(event) = rx.try_recv() {
        phases.push(event.phase);
    }
    phases
}

fn dedup_consecutive(phases: Vec<ActionPhase>) -> Vec<ActionPhase> {
    let mut out: Vec<ActionPhase> = Vec::new();
    for phase in phases {
        if out.last() != Some(&phase) {
            out.push(phase);
        }
    }
    out
}

#[tokio::test]
async fn register_then_transfer_emits_phases_in_order() {
    let wallet = test_wallet();
    let registration = wallet
        .orchestrator
        .register_user(account(), None)
        .await
        .unwrap();
    assert!(registration.near_public_key.starts_with("ed25519:"));

    // The relay payload's VRF proof must verify against the deterministic key.
    let vrf_data = &registration.relay_payload.vrf_data;
    assert!(vrf_verify(
        &vrf_data.public_key,
        &vrf_data.vrf_input_data,
        &vrf_data.vrf_output,
        &vrf_data.vrf_proof,
    ));
    assert_eq!(
        vrf_data.public_key,
        registration.relay_payload.deterministic_vrf_public_key
    );

    let (progress_tx, mut progress_rx) = progress_channel();
    let result = wallet
        .orchestrator
        .execute_actions(
            account(),
            vec![transfer("bob.test", "1000000000000000000000000")],
            ExecuteOptions {
                progress: Some(progress_tx),
                ..ExecuteOptions::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(result.broadcasts.len(), 1);
    assert!(!result.broadcasts[0].transaction_hash.is_empty());

    let sent = wallet.chain.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].signer_id, "alice.test");
    assert_eq!(sent[0].receiver_id, "bob.test");
    assert_eq!(sent[0].nonce, 1, "chain nonce 0 + 1");

    let phases = dedup_consecutive(drain_phases(&mut progress_rx));
    assert_eq!(
        phases,
        vec![
            ActionPhase::Preparation,
            ActionPhase::GeneratingChallenge,
            ActionPhase::WebauthnAuthentication,
            ActionPhase::AuthenticationComplete,
            ActionPhase::TransactionSigningProgress,
            ActionPhase::TransactionSigningComplete,
            ActionPhase::Broadcasting,
            ActionPhase::ActionComplete,
        ]
    );
}

#[tokio::test]
async fn registration_persists_user_authenticator_and_keys() {
    let wallet = test_wallet();
    let registration = wallet
        .orchestrator
        .register_user(account(), None)
        .await
        .unwrap();

    let user: UserRecord = store::get_typed(
        wallet.store.as_ref(),
        store::namespaces::USERS,
        "alice.test",
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(user.near_public_key, registration.near_public_key);
    assert_eq!(user.device_number, 1);

    let authenticator: AuthenticatorRecord = store::get_typed(
        wallet.store.as_ref(),
        store::namespaces::AUTHENTICATORS,
        &format!("alice.test:{}", registration.credential_id),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(authenticator.device_number, 1);
    assert_eq!(
        authenticator.vrf_public_keys,
        vec![registration.vrf_public_key_b64u.clone()]
    );

    assert!(wallet
        .store
        .get(store::namespaces::NEAR_KEYS, "alice.test")
        .await
        .unwrap()
        .is_some());
    assert!(wallet
        .store
        .get(store::namespaces::NEAR_KEYS, "alice.test:vrf")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn batched_actions_go_into_one_transaction() {
    let wallet = test_wallet();
    wallet
        .orchestrator
        .register_user(account(), None)
        .await
        .unwrap();

    let request = TransactionSigningRequest {
        receiver_id: AccountId::new("contract.test").unwrap(),
        actions: vec![
            ActionParams::FunctionCall {
                method_name: "foo".to_string(),
                args: "{\"a\":1}".to_string(),
                gas: "30000000000000".to_string(),
                deposit: "0".to_string(),
            },
            ActionParams::Transfer {
                deposit: "1".to_string(),
            },
        ],
    };
    wallet
        .orchestrator
        .execute_actions(account(), vec![request], ExecuteOptions::default())
        .await
        .unwrap();

    let sent = wallet.chain.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].action_count, 2);
    assert_eq!(sent[0].nonce, 1);
}

#[tokio::test]
async fn multi_transaction_nonces_are_contiguous_and_sequential_broadcast_is_ordered() {
    let wallet = test_wallet();
    wallet
        .orchestrator
        .register_user(account(), None)
        .await
        .unwrap();
    wallet.chain.account_nonce.store(41, Ordering::SeqCst);

    let result = wallet
        .orchestrator
        .execute_actions(
            account(),
            vec![
                transfer("one.test", "1"),
                transfer("two.test", "2"),
                transfer("three.test", "3"),
            ],
            ExecuteOptions {
                execute_sequentially: true,
                ..ExecuteOptions::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(result.broadcasts.len(), 3);

    let sent = wallet.chain.sent();
    assert_eq!(sent.len(), 3);
    let receivers: Vec<&str> = sent.iter().map(|s| s.receiver_id.as_str()).collect();
    assert_eq!(receivers, vec!["one.test", "two.test", "three.test"]);
    for (i, tx) in sent.iter().enumerate() {
        assert_eq!(tx.nonce, 42 + i as u64);
        assert_eq!(tx.block_hash, sent[0].block_hash);
    }
}

#[tokio::test]
async fn locked_vrf_session_fails_with_vrf_locked() {
    let wallet = test_wallet();
    wallet
        .orchestrator
        .register_user(account(), None)
        .await
        .unwrap();
    wallet.orchestrator.vrf.lock().await.unwrap();

    let (progress_tx, mut progress_rx) = progress_channel();
    let before_calls = Arc::new(AtomicUsize::new(0));
    let after_success: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));
    let after_failure: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));

    let err = wallet
        .orchestrator
        .execute_actions(
            account(),
            vec![transfer("bob.test", "1")],
            ExecuteOptions {
                progress: Some(progress_tx),
                hooks: CallHooks {
                    before_call: Some(Box::new({
                        let before_calls = before_calls.clone();
                        move || {
                            before_calls.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        }
                    })),
                    after_call: Some(Box::new({
                        let after_success = after_success.clone();
                        let after_failure = after_failure.clone();
                        move |success| {
                            if success {
                                after_success.fetch_add(1, Ordering::SeqCst);
                            } else {
                                after_failure.fetch_add(1, Ordering::SeqCst);
                            }
                            Ok(())
                        }
                    })),
                },
                ..ExecuteOptions::default()
            },
        )
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::VrfLocked);
    assert_eq!(before_calls.load(Ordering::SeqCst), 1);
    assert_eq!(after_success.load(Ordering::SeqCst), 0);
    assert_eq!(after_failure.load(Ordering::SeqCst), 1);
    assert!(wallet.chain.sent().is_empty());

    let phases = drain_phases(&mut progress_rx);
    assert_eq!(phases.last(), Some(&ActionPhase::ActionError));
}

#[tokio::test]
async fn after_call_runs_exactly_once_on_success_even_if_it_fails() {
    let wallet = test_wallet();
    wallet
        .orchestrator
        .register_user(account(), None)
        .await
        .unwrap();

    let after_calls = Arc::new(AtomicUsize::new(0));
    let result = wallet
        .orchestrator
        .execute_actions(
            account(),
            vec![transfer("bob.test", "1")],
            ExecuteOptions {
                hooks: CallHooks {
                    before_call: None,
                    after_call: Some(Box::new({
                        let after_calls = after_calls.clone();
                        move |_success| {
                            after_calls.fetch_add(1, Ordering::SeqCst);
                            Err(passkey_core::WalletError::internal("hook blew up"))
                        }
                    })),
                },
                ..ExecuteOptions::default()
            },
        )
        .await;

    // The hook error never fails the transaction.
    assert!(result.is_ok());
    assert_eq!(after_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn denied_assertion_surfaces_credential_denied() {
    let wallet = test_wallet();
    wallet
        .orchestrator
        .register_user(account(), None)
        .await
        .unwrap();
    wallet.credentials.deny_assertions.store(true, Ordering::SeqCst);

    let err = wallet
        .orchestrator
        .execute_actions(
            account(),
            vec![transfer("bob.test", "1")],
            ExecuteOptions::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::CredentialDenied);
    assert!(wallet.chain.sent().is_empty());
}

#[tokio::test]
async fn pre_cancelled_token_stops_before_any_work() {
    let wallet = test_wallet();
    wallet
        .orchestrator
        .register_user(account(), None)
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = wallet
        .orchestrator
        .execute_actions(
            account(),
            vec![transfer("bob.test", "1")],
            ExecuteOptions {
                cancel,
                ..ExecuteOptions::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::Cancelled);
    assert!(wallet.chain.sent().is_empty());
    assert_eq!(wallet.chain.verify_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn login_unlocks_the_stored_vrf_keypair() {
    let wallet = test_wallet();
    let registration = wallet
        .orchestrator
        .register_user(account(), None)
        .await
        .unwrap();

    // Logout closes the session; a transfer is refused.
    wallet.orchestrator.logout().await.unwrap();
    let err = wallet
        .orchestrator
        .execute_actions(
            account(),
            vec![transfer("bob.test", "1")],
            ExecuteOptions::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::VrfLocked);

    // Login re-opens it from the stored record and the same transfer works.
    let vrf_public_key = wallet.orchestrator.login(account()).await.unwrap();
    assert_eq!(vrf_public_key, registration.vrf_public_key_b64u);
    wallet
        .orchestrator
        .execute_actions(
            account(),
            vec![transfer("bob.test", "1")],
            ExecuteOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(wallet.chain.sent().len(), 1);
}

#[tokio::test]
async fn unknown_user_fails_in_preparation() {
    let wallet = test_wallet();
    let err = wallet
        .orchestrator
        .execute_actions(
            account(),
            vec![transfer("bob.test", "1")],
            ExecuteOptions::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::UserNotFound);
}

#[tokio::test]
async fn invalid_action_params_fail_in_preparation() {
    let wallet = test_wallet();
    wallet
        .orchestrator
        .register_user(account(), None)
        .await
        .unwrap();

    let err = wallet
        .orchestrator
        .execute_actions(
            account(),
            vec![TransactionSigningRequest {
                receiver_id: AccountId::new("bob.test").unwrap(),
                actions: vec![ActionParams::Transfer {
                    deposit: "not-a-number".to_string(),
                }],
            }],
            ExecuteOptions::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InputInvalid);
    assert_eq!(wallet.chain.verify_calls.load(Ordering::SeqCst), 0);
}
