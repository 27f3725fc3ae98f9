use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde_json::json;

use passkey_core::clock::ManualClock;
use passkey_core::errors::ErrorCode;
use passkey_core::near::Action;
use passkey_core::AccountId;

use crate::accounts::{
    AccountService, AccountServiceConfig, CreateAccountAndRegisterRequest,
};
use crate::queue::TransactionQueue;
use crate::session::{HmacSha256Signer, SessionService};
use crate::tests::mock_rpc::{relayer_private_key, AccountBehavior, RelayRpc};

const INITIAL_BALANCE: u128 = 50_000_000_000_000_000_000_000;

fn service_with(rpc: Arc<RelayRpc>, strict: bool) -> (AccountService, Arc<SessionService>) {
    let sessions = Arc::new(SessionService::new(
        Arc::new(HmacSha256Signer::new(b"test-secret".to_vec())),
        Arc::new(ManualClock::new(1_700_000_000_000)),
        60 * 60 * 1000,
        15 * 60 * 1000,
    ));
    let service = AccountService::new(
        rpc,
        Arc::new(TransactionQueue::new()),
        sessions.clone(),
        AccountServiceConfig {
            relayer_account_id: AccountId::new("relayer.test").unwrap(),
            relayer_private_key: relayer_private_key(),
            webauthn_contract_id: AccountId::new("webauthn.test").unwrap(),
            account_initial_balance: INITIAL_BALANCE,
            create_and_register_gas: 120_000_000_000_000,
            strict_exists_check: strict,
        },
    )
    .unwrap();
    (service, sessions)
}

#[tokio::test(start_paused = true)]
async fn existence_probe_distinguishes_present_and_missing() {
    let rpc = Arc::new(RelayRpc::new());
    rpc.set_behavior("present.test", AccountBehavior::Exists);
    rpc.set_behavior("missing.test", AccountBehavior::DoesNotExist);
    let (service, _) = service_with(rpc.clone(), false);

    assert!(!service
        .check_account_exists(&AccountId::new("missing.test").unwrap())
        .await
        .unwrap());
    assert!(service
        .check_account_exists(&AccountId::new("present.test").unwrap())
        .await
        .unwrap());
}

#[tokio::test(start_paused = true)]
async fn persistent_transient_errors_fall_back_to_not_found() {
    let rpc = Arc::new(RelayRpc::new());
    rpc.set_behavior("flaky.test", AccountBehavior::Transient);
    let (service, _) = service_with(rpc.clone(), false);

    let exists = service
        .check_account_exists(&AccountId::new("flaky.test").unwrap())
        .await
        .unwrap();
    assert!(!exists, "safety valve maps persistent flakiness to missing");
    assert_eq!(rpc.view_account_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn strict_mode_surfaces_the_transient_error() {
    let rpc = Arc::new(RelayRpc::new());
    rpc.set_behavior("flaky.test", AccountBehavior::Transient);
    let (service, _) = service_with(rpc, true);

    let err = service
        .check_account_exists(&AccountId::new("flaky.test").unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::RpcHttp);
}

#[tokio::test(start_paused = true)]
async fn create_account_builds_the_three_action_transaction() {
    let rpc = Arc::new(RelayRpc::new());
    let (service, _) = service_with(rpc.clone(), false);

    let new_key =
        passkey_core::encoders::encode_near_public_key(&[9u8; 32]);
    let result = service
        .create_account(AccountId::new("fresh.test").unwrap(), &new_key)
        .await
        .unwrap();
    assert_eq!(result.transaction_hash.as_deref(), Some("relaytx123"));

    let sent = rpc.sent();
    assert_eq!(sent.len(), 1);
    let tx = &sent[0].transaction;
    assert_eq!(tx.signer_id.as_str(), "relayer.test");
    assert_eq!(tx.receiver_id.as_str(), "fresh.test");
    assert_eq!(tx.nonce, 11, "relay access-key nonce + 1");
    assert_eq!(tx.actions.len(), 3);
    assert!(matches!(tx.actions[0], Action::CreateAccount));
    assert!(matches!(
        tx.actions[1],
        Action::Transfer { deposit } if deposit == INITIAL_BALANCE
    ));
    assert!(matches!(tx.actions[2], Action::AddKey { .. }));
}

#[tokio::test(start_paused = true)]
async fn create_account_rejects_existing_accounts_before_broadcast() {
    let rpc = Arc::new(RelayRpc::new());
    rpc.set_behavior("taken.test", AccountBehavior::Exists);
    let (service, _) = service_with(rpc.clone(), false);

    let err = service
        .create_account(
            AccountId::new("taken.test").unwrap(),
            &passkey_core::encoders::encode_near_public_key(&[9u8; 32]),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::AccountAlreadyExists);
    assert!(rpc.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn create_and_register_sends_one_deposit_bearing_call() {
    let rpc = Arc::new(RelayRpc::new());
    let (service, _) = service_with(rpc.clone(), false);

    service
        .create_account_and_register_user(CreateAccountAndRegisterRequest {
            new_account_id: AccountId::new("fresh.test").unwrap(),
            new_public_key: passkey_core::encoders::encode_near_public_key(&[9u8; 32]),
            vrf_data: json!({ "user_id": "fresh.test" }),
            webauthn_registration: json!({ "id": "cred-1" }),
            deterministic_vrf_public_key: json!([1, 2, 3]),
            authenticator_options: Some(json!({ "user_verification": "required" })),
        })
        .await
        .unwrap();

    let sent = rpc.sent();
    assert_eq!(sent.len(), 1);
    let tx = &sent[0].transaction;
    assert_eq!(tx.receiver_id.as_str(), "webauthn.test");
    match &tx.actions[0] {
        Action::FunctionCall(call) => {
            assert_eq!(call.method_name, "create_account_and_register_user");
            assert_eq!(call.deposit, INITIAL_BALANCE);
            assert_eq!(call.gas, 120_000_000_000_000);
            let args: serde_json::Value = serde_json::from_slice(&call.args).unwrap();
            assert_eq!(args["new_account_id"], json!("fresh.test"));
            assert_eq!(
                args["authenticator_options"],
                json!({ "user_verification": "required" })
            );
        }
        other => panic!("unexpected action {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn create_and_register_maps_receipt_failures() {
    let rpc = Arc::new(RelayRpc::new());
    *rpc.forced_outcome.lock().unwrap() = Some(json!({
        "status": {
            "Failure": {
                "ActionError": { "index": 0, "kind": { "AccountAlreadyExists": {} } }
            }
        },
        "transaction": { "hash": "x" },
        "receipts_outcome": [],
    }));
    let (service, _) = service_with(rpc, false);

    let err = service
        .create_account_and_register_user(CreateAccountAndRegisterRequest {
            new_account_id: AccountId::new("fresh.test").unwrap(),
            new_public_key: passkey_core::encoders::encode_near_public_key(&[9u8; 32]),
            vrf_data: json!({}),
            webauthn_registration: json!({}),
            deterministic_vrf_public_key: json!([]),
            authenticator_options: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::AccountAlreadyExists);
}

#[tokio::test]
async fn verified_authentication_issues_a_session_credential() {
    let rpc = Arc::new(RelayRpc::new());
    let (service, sessions) = service_with(rpc.clone(), false);

    let result = service
        .verify_authentication(
            json!({ "user_id": "alice.test" }),
            json!({ "id": "cred-1" }),
        )
        .await
        .unwrap();
    assert!(result.verified);
    let token = result.session_credential.unwrap();
    let claims = sessions.verify(&token).unwrap();
    assert_eq!(claims.sub, "alice.test");

    rpc.verify_ok.store(false, Ordering::SeqCst);
    let rejected = service
        .verify_authentication(json!({ "user_id": "alice.test" }), json!({}))
        .await
        .unwrap();
    assert!(!rejected.verified);
    assert!(rejected.session_credential.is_none());
}
