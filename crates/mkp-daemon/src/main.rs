//! mkp-daemon entry point.
//!
//! Thin on purpose: load config and secrets, connect to Postgres, build the
//! provider clients and shared state, wire middleware, serve.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use mkp_config::secrets::{resolve_secrets, SecretsMode};
use mkp_config::MarketplaceSettings;
use mkp_daemon::{routes, state};
use mkp_providers::{DiscordIdentityProvider, StripePaymentProcessor};
use sqlx::PgPool;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Dev convenience; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let loaded = mkp_config::load_from_env().context("load config")?;
    let settings = MarketplaceSettings::from_config_json(&loaded.config_json)?;
    let secrets = resolve_secrets(&loaded.config_json, SecretsMode::Serve)?;
    info!(config_hash = %loaded.config_hash, moderation = settings.moderation, "config loaded");

    let db = mkp_db::connect_from_env().await?;
    let status = mkp_db::status(&db).await?;
    if !status.has_ledger_schema {
        warn!("ledger schema missing; run `mkp db migrate`");
    }

    let identity = DiscordIdentityProvider::new(
        settings.identity_client_id.clone(),
        secrets
            .identity_client_secret
            .clone()
            .context("identity client secret not resolved")?,
        settings.identity_redirect_uri.clone(),
    )
    .context("build identity client")?;
    let payments = StripePaymentProcessor::new(
        secrets
            .payments_secret_key
            .clone()
            .context("payments secret key not resolved")?,
        settings.payments_client_id.clone(),
        settings.payments_onboarding_redirect_uri.clone(),
    )
    .context("build payments client")?;

    let cors = cors_from_origins(&settings.cors_origins);
    let shared = Arc::new(state::AppState::new(
        db,
        settings,
        loaded.config_hash,
        Arc::new(identity),
        Arc::new(payments),
        secrets.admin_credential,
    ));

    spawn_session_purge(shared.db.clone(), shared.settings.session_max_age);

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8080)));
    info!("mkp-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// Hourly sweep of sessions past their max age.
fn spawn_session_purge(db: PgPool, max_age: Duration) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(60 * 60));
        loop {
            tick.tick().await;
            match mkp_db::purge_expired_sessions(&db, max_age).await {
                Ok(0) => {}
                Ok(purged) => info!(purged, "expired sessions purged"),
                Err(e) => warn!(error = %e, "session purge failed"),
            }
        }
    });
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("MKP_DAEMON_ADDR").ok()?.parse().ok()
}

/// CORS: allow only the configured front-end origins.
fn cors_from_origins(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
