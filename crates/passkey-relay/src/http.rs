//! HTTP surface.
//!
//! Thin axum handlers over the services; every error renders as
//! `{ code, message, details? }` with a status derived from the code.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::instrument;

use passkey_core::{AccountId, ErrorCode, WalletError};

use crate::accounts::{AccountService, CreateAccountAndRegisterRequest};
use crate::queue::TransactionQueue;
use crate::session::SessionService;
use crate::shamir_service::ShamirKeyService;

#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<AccountService>,
    pub shamir: Arc<ShamirKeyService>,
    pub sessions: Arc<SessionService>,
    pub queue: Arc<TransactionQueue>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/accounts/create", post(create_account))
        .route("/accounts/create-and-register", post(create_and_register))
        .route("/auth/verify", post(verify_authentication))
        .route("/auth/refresh", post(refresh_session))
        .route("/shamir/apply-lock", post(apply_server_lock))
        .route("/shamir/remove-lock", post(remove_server_lock))
        .route("/shamir/rotate", post(rotate_key))
        .route("/shamir/key-info", get(key_info))
        .route("/shamir/grace", get(list_grace).post(add_grace))
        .route("/shamir/grace/{key_id}", delete(remove_grace))
        .with_state(state)
}

/// Error wrapper carrying the HTTP mapping.
pub struct ApiError(pub WalletError);

impl From<WalletError> for ApiError {
    fn from(err: WalletError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.code {
            ErrorCode::InputInvalid
            | ErrorCode::AccountIdInvalid
            | ErrorCode::ActionInvalid => StatusCode::BAD_REQUEST,
            ErrorCode::AccountAlreadyExists => StatusCode::CONFLICT,
            ErrorCode::UnknownKey
            | ErrorCode::UserNotFound
            | ErrorCode::KeyNotFound
            | ErrorCode::AccountDoesNotExist => StatusCode::NOT_FOUND,
            ErrorCode::SessionExpired => StatusCode::UNAUTHORIZED,
            ErrorCode::RpcHttp | ErrorCode::RpcEmpty | ErrorCode::RpcError => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({
            "code": self.0.code,
            "message": self.0.message,
            "details": self.0.details,
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[instrument(skip_all)]
async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "ok": true,
        "queue": state.queue.stats(),
    }))
}

#[derive(Debug, Deserialize)]
struct CreateAccountBody {
    account_id: AccountId,
    public_key: String,
}

#[instrument(skip_all, fields(account_id = %body.account_id))]
async fn create_account(
    State(state): State<AppState>,
    Json(body): Json<CreateAccountBody>,
) -> ApiResult<crate::accounts::CreateAccountResult> {
    Ok(Json(
        state
            .accounts
            .create_account(body.account_id, &body.public_key)
            .await?,
    ))
}

#[instrument(skip_all, fields(account_id = %body.new_account_id))]
async fn create_and_register(
    State(state): State<AppState>,
    Json(body): Json<CreateAccountAndRegisterRequest>,
) -> ApiResult<crate::accounts::CreateAccountResult> {
    Ok(Json(
        state.accounts.create_account_and_register_user(body).await?,
    ))
}

#[derive(Debug, Deserialize)]
struct VerifyAuthenticationBody {
    vrf_data: Value,
    webauthn_authentication: Value,
}

#[instrument(skip_all)]
async fn verify_authentication(
    State(state): State<AppState>,
    Json(body): Json<VerifyAuthenticationBody>,
) -> ApiResult<crate::accounts::VerifyAuthenticationResult> {
    Ok(Json(
        state
            .accounts
            .verify_authentication(body.vrf_data, body.webauthn_authentication)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
struct RefreshBody {
    token: String,
}

#[derive(Debug, Serialize)]
struct RefreshResponse {
    token: String,
}

#[instrument(skip_all)]
async fn refresh_session(
    State(state): State<AppState>,
    Json(body): Json<RefreshBody>,
) -> ApiResult<RefreshResponse> {
    let token = state.sessions.refresh(&body.token)?;
    Ok(Json(RefreshResponse { token }))
}

// === SHAMIR ENDPOINTS ===
// Request/response field names mirror the client's lock transport.

#[derive(Debug, Deserialize)]
struct ApplyLockBody {
    kek_c_b64u: String,
}

#[derive(Debug, Serialize)]
struct ApplyLockResponse {
    kek_cs_b64u: String,
    key_id: String,
}

#[instrument(skip_all)]
async fn apply_server_lock(
    State(state): State<AppState>,
    Json(body): Json<ApplyLockBody>,
) -> ApiResult<ApplyLockResponse> {
    let (kek_cs_b64u, key_id) = state.shamir.apply_server_lock(&body.kek_c_b64u).await?;
    Ok(Json(ApplyLockResponse { kek_cs_b64u, key_id }))
}

#[derive(Debug, Deserialize)]
struct RemoveLockBody {
    kek_cs_b64u: String,
    key_id: String,
}

#[derive(Debug, Serialize)]
struct RemoveLockResponse {
    kek_c_b64u: String,
}

#[instrument(skip_all)]
async fn remove_server_lock(
    State(state): State<AppState>,
    Json(body): Json<RemoveLockBody>,
) -> ApiResult<RemoveLockResponse> {
    let kek_c_b64u = state
        .shamir
        .remove_server_lock(&body.kek_cs_b64u, &body.key_id)
        .await?;
    Ok(Json(RemoveLockResponse { kek_c_b64u }))
}

#[derive(Debug, Deserialize)]
struct RotateBody {
    #[serde(default = "default_true")]
    keep_current_in_grace: bool,
    #[serde(default = "default_true")]
    persist_grace: bool,
}

fn default_true() -> bool {
    true
}

impl Default for RotateBody {
    fn default() -> Self {
        RotateBody {
            keep_current_in_grace: true,
            persist_grace: true,
        }
    }
}

#[instrument(skip_all)]
async fn rotate_key(
    State(state): State<AppState>,
    body: Option<Json<RotateBody>>,
) -> ApiResult<crate::shamir_service::RotationResult> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    Ok(Json(
        state
            .shamir
            .rotate(body.keep_current_in_grace, body.persist_grace)
            .await?,
    ))
}

#[instrument(skip_all)]
async fn key_info(State(state): State<AppState>) -> ApiResult<crate::shamir_service::KeyInfo> {
    Ok(Json(state.shamir.key_info().await))
}

#[instrument(skip_all)]
async fn list_grace(State(state): State<AppState>) -> ApiResult<Vec<String>> {
    Ok(Json(state.shamir.list_grace().await))
}

#[derive(Debug, Deserialize)]
struct AddGraceBody {
    e_s_b64u: String,
    d_s_b64u: String,
}

#[instrument(skip_all)]
async fn add_grace(
    State(state): State<AppState>,
    Json(body): Json<AddGraceBody>,
) -> ApiResult<Value> {
    let key_id = state.shamir.add_grace(&body.e_s_b64u, &body.d_s_b64u).await?;
    Ok(Json(json!({ "key_id": key_id })))
}

#[instrument(skip_all)]
async fn remove_grace(
    State(state): State<AppState>,
    Path(key_id): Path<String>,
) -> ApiResult<Value> {
    let removed = state.shamir.remove_grace(&key_id).await?;
    Ok(Json(json!({ "removed": removed })))
}
