//! Relay HTTP entrypoint.
//!
//! - `.env` values loaded at startup; configuration via flags or env vars.
//! - `RUST_LOG`-style filtering through `tracing-subscriber`, with `log`
//!   records from the library crates bridged in.
//! - CORS and request tracing on every route; graceful shutdown on ctrl-c.

use axum::http::Method;
use clap::Parser;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use passkey_chain_client::HttpChainClient;
use passkey_core::clock::{SharedClock, SystemClock};
use passkey_core::shamir3pass::Shamir3Pass;

use passkey_relay::accounts::AccountServiceConfig;
use passkey_relay::http::{router, AppState};
use passkey_relay::session::HmacSha256Signer;
use passkey_relay::shamir_service::{spawn_rotation_cron, ServerKeypair};
use passkey_relay::{
    AccountService, RelayConfig, SessionService, ShamirKeyService, TransactionQueue,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    tracing_log::LogTracer::init()?;
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = RelayConfig::parse();
    let clock: SharedClock = Arc::new(SystemClock);

    let rpc = Arc::new(HttpChainClient::new(config.rpc_url.clone())?);
    let queue = Arc::new(TransactionQueue::new());

    // Shamir key service: configured keypair, or a fresh one per boot.
    let shamir = match &config.shamir_p_b64u {
        Some(p) => Shamir3Pass::new(p)?,
        None => Shamir3Pass::new_default(),
    };
    let current = match (&config.shamir_e_s_b64u, &config.shamir_d_s_b64u) {
        (Some(e_s), Some(d_s)) => ServerKeypair::from_b64u(e_s, d_s)?,
        _ => {
            warn!("no Shamir server keypair configured; generating an ephemeral one");
            ServerKeypair::generate(&shamir)?
        }
    };
    let shamir_service = Arc::new(ShamirKeyService::new(
        shamir,
        current,
        config.shamir_grace_keys_file.clone(),
        config.shamir_max_grace_keys,
    ));
    let loaded = shamir_service.load_grace_keys().await?;
    if loaded > 0 {
        info!(loaded, "loaded persisted grace keys");
    }
    if let Some(minutes) = config.shamir_rotation_interval_minutes {
        spawn_rotation_cron(shamir_service.clone(), minutes);
        info!(minutes, "key rotation cron enabled");
    }

    // Sessions: HMAC over a configured secret, or an ephemeral one.
    let session_secret = match &config.session_secret {
        Some(secret) => secret.clone().into_bytes(),
        None => {
            warn!("no SESSION_SECRET configured; sessions will not survive restarts");
            let mut secret = vec![0u8; 32];
            getrandom::getrandom(&mut secret)?;
            secret
        }
    };
    let sessions = Arc::new(SessionService::new(
        Arc::new(HmacSha256Signer::new(session_secret)),
        clock.clone(),
        config.session_ttl_minutes * 60 * 1000,
        config.session_refresh_window_minutes * 60 * 1000,
    ));

    let accounts = Arc::new(AccountService::new(
        rpc,
        queue.clone(),
        sessions.clone(),
        AccountServiceConfig {
            relayer_account_id: config.relayer_account()?,
            relayer_private_key: config.relayer_private_key.clone(),
            webauthn_contract_id: config.contract_account()?,
            account_initial_balance: config.initial_balance()?,
            create_and_register_gas: config.create_and_register_gas,
            strict_exists_check: config.strict_exists_check,
        },
    )?);

    let app = router(AppState {
        accounts,
        shamir: shamir_service,
        sessions,
        queue,
    })
    .layer(TraceLayer::new_for_http())
    .layer(
        cors::CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers(cors::Any)
            .allow_origin(cors::Any),
    );

    let addr = SocketAddr::new(config.host, config.port);
    info!(%addr, network = %config.network_id, "relay listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;
    Ok(())
}
