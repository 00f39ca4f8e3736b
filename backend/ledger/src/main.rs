//! Supply-chain ledger client — entry point.
//!
//! Binds a signing client to the tracking contract on the configured
//! chain, loads the product table once, and exposes the registration and
//! stage-transfer workflows over a small Axum REST API.  The contract is
//! the sole source of truth; the table held here is only a snapshot.

mod api;
mod chain;
mod config;
mod errors;
mod product;
mod workflows;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use workflows::LedgerState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    // Load config from environment.
    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // ─── Contract binding ─────────────────────────────────
    info!(
        "Connecting to {} (chain {}) — contract {}",
        config.rpc_url, config.chain_id, config.contract_address
    );
    let ledger = chain::connect(&config)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    let state = Arc::new(LedgerState::new(Arc::new(ledger)));

    // Initial table load; a failure here only logs — the first reload
    // can be re-triggered through the API.
    match state.reload().await {
        Ok(n) => info!("Loaded {n} products"),
        Err(e) => warn!("Initial product load failed: {e}"),
    }

    // ─── REST API ─────────────────────────────────────────
    let app = Router::new()
        .route("/health", get(api::health))
        .route(
            "/products",
            get(api::list_products).post(api::register_product),
        )
        .route("/products/reload", post(api::reload_products))
        .route("/products/:id/transfer", post(api::transfer_product))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
