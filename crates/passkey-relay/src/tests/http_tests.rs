use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use passkey_core::clock::ManualClock;
use passkey_core::shamir3pass::{decode_biguint_b64u, encode_biguint_b64u, Shamir3Pass};
use passkey_core::AccountId;

use crate::accounts::{AccountService, AccountServiceConfig};
use crate::http::{router, AppState};
use crate::queue::TransactionQueue;
use crate::session::{HmacSha256Signer, SessionService};
use crate::shamir_service::{ServerKeypair, ShamirKeyService};
use crate::tests::mock_rpc::{relayer_private_key, RelayRpc};

fn app_state() -> AppState {
    app_state_with_rpc().0
}

fn app_state_with_rpc() -> (AppState, Arc<RelayRpc>) {
    let rpc = Arc::new(RelayRpc::new());
    let queue = Arc::new(TransactionQueue::new());
    let sessions = Arc::new(SessionService::new(
        Arc::new(HmacSha256Signer::new(b"http-test-secret".to_vec())),
        Arc::new(ManualClock::new(1_700_000_000_000)),
        3_600_000,
        900_000,
    ));
    let shamir = Shamir3Pass::new_default();
    let current = ServerKeypair::generate(&shamir).unwrap();
    let shamir_service = Arc::new(ShamirKeyService::new(shamir, current, None, 4));
    let accounts = Arc::new(
        AccountService::new(
            rpc.clone(),
            queue.clone(),
            sessions.clone(),
            AccountServiceConfig {
                relayer_account_id: AccountId::new("relayer.test").unwrap(),
                relayer_private_key: relayer_private_key(),
                webauthn_contract_id: AccountId::new("webauthn.test").unwrap(),
                account_initial_balance: 1_000,
                create_and_register_gas: 120_000_000_000_000,
                strict_exists_check: false,
            },
        )
        .unwrap(),
    );
    (
        AppState {
            accounts,
            shamir: shamir_service,
            sessions,
            queue,
        },
        rpc,
    )
}

async fn post_json(app: &axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::post(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn get_json(app: &axum::Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn key_info_reports_the_active_key() {
    let state = app_state();
    let app = router(state.clone());

    let (status, body) = get_json(&app, "/shamir/key-info").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["current_key_id"].as_str().unwrap(),
        state.shamir.key_info().await.current_key_id
    );
    assert!(body["p_b64u"].is_string());
}

#[tokio::test]
async fn apply_and_remove_lock_round_trip_over_http() {
    let state = app_state();
    let app = router(state);
    let shamir = Shamir3Pass::new_default();
    let kek = shamir.random_kek().unwrap();

    let (status, applied) = post_json(
        &app,
        "/shamir/apply-lock",
        json!({ "kek_c_b64u": encode_biguint_b64u(&kek) }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let kek_cs = applied["kek_cs_b64u"].as_str().unwrap();
    let key_id = applied["key_id"].as_str().unwrap();

    let (status, removed) = post_json(
        &app,
        "/shamir/remove-lock",
        json!({ "kek_cs_b64u": kek_cs, "key_id": key_id }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        decode_biguint_b64u(removed["kek_c_b64u"].as_str().unwrap()).unwrap(),
        kek
    );
}

#[tokio::test]
async fn unknown_key_maps_to_404_with_structured_error() {
    let state = app_state();
    let app = router(state);
    let shamir = Shamir3Pass::new_default();
    let kek = shamir.random_kek().unwrap();

    let (status, body) = post_json(
        &app,
        "/shamir/remove-lock",
        json!({ "kek_cs_b64u": encode_biguint_b64u(&kek), "key_id": "missing" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"].as_str().unwrap(), "UNKNOWN_KEY");
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn verify_endpoint_returns_session_credential() {
    let state = app_state();
    let app = router(state.clone());

    let (status, body) = post_json(
        &app,
        "/auth/verify",
        json!({
            "vrf_data": { "user_id": "alice.test" },
            "webauthn_authentication": { "id": "cred-1" },
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verified"], json!(true));
    let token = body["session_credential"].as_str().unwrap();
    assert_eq!(state.sessions.verify(token).unwrap().sub, "alice.test");
}

#[tokio::test]
async fn rotate_endpoint_rotates_and_lists_grace() {
    let state = app_state();
    let app = router(state.clone());
    let before = state.shamir.key_info().await.current_key_id;

    let (status, body) = post_json(&app, "/shamir/rotate", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["previous_key_id"].as_str().unwrap(), before);

    let (status, grace) = get_json(&app, "/shamir/grace").await;
    assert_eq!(status, StatusCode::OK);
    assert!(grace
        .as_array()
        .unwrap()
        .iter()
        .any(|id| id.as_str() == Some(before.as_str())));
}

#[tokio::test]
async fn create_account_conflict_maps_to_409() {
    let (state, rpc) = app_state_with_rpc();
    let app = router(state);
    let public_key = passkey_core::encoders::encode_near_public_key(&[4u8; 32]);

    let (status, body) = post_json(
        &app,
        "/accounts/create",
        json!({ "account_id": "fresh.test", "public_key": public_key }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["transaction_hash"], json!("relaytx123"));

    rpc.set_behavior("taken.test", crate::tests::mock_rpc::AccountBehavior::Exists);
    let (status, body) = post_json(
        &app,
        "/accounts/create",
        json!({ "account_id": "taken.test", "public_key": public_key }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"].as_str().unwrap(), "ACCOUNT_ALREADY_EXISTS");
}
