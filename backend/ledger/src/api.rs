//! Axum REST API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{LedgerError, Rejection};
use crate::product::{Product, TransferKind};
use crate::workflows::LedgerState;

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub description: String,
}

#[derive(Deserialize)]
pub struct TransferRequest {
    pub stage: TransferKind,
    pub to: String,
}

#[derive(Serialize)]
pub struct ProductsResponse {
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<&'static str>,
    pub products: Vec<Product>,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    /// Id reported by the `ProductRegistered` event; `null` when the
    /// transaction confirmed but the event was absent.
    pub id: Option<u64>,
}

#[derive(Serialize)]
pub struct TransferResponse {
    pub id: u64,
    pub stage: &'static str,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub causes: Option<Vec<String>>,
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /products`
///
/// Serves the current snapshot without touching the chain.
pub async fn list_products(State(state): State<Arc<LedgerState>>) -> impl IntoResponse {
    Json(products_body(state.snapshot().await))
}

/// `POST /products/reload`
///
/// Triggers a full-table reload.  A failed reload is logged and the
/// previous (stale) table is served; the endpoint never errors for it.
pub async fn reload_products(State(state): State<Arc<LedgerState>>) -> impl IntoResponse {
    if let Err(e) = state.reload().await {
        warn!("Reload failed, serving previous table: {e}");
    }
    Json(products_body(state.snapshot().await))
}

/// `POST /products`
pub async fn register_product(
    State(state): State<Arc<LedgerState>>,
    Json(req): Json<RegisterRequest>,
) -> Response {
    match state.register(&req.name, &req.description).await {
        Ok(id) => (StatusCode::CREATED, Json(RegisterResponse { id })).into_response(),
        Err(e) => error_response(e, vec!["caller is not the manufacturer".to_string()]),
    }
}

/// `POST /products/:id/transfer`
pub async fn transfer_product(
    State(state): State<Arc<LedgerState>>,
    Path(id): Path<u64>,
    Json(req): Json<TransferRequest>,
) -> Response {
    match state.transfer(req.stage, id, &req.to).await {
        Ok(()) => (
            StatusCode::OK,
            Json(TransferResponse {
                id,
                stage: req.stage.target_stage().as_str(),
            }),
        )
            .into_response(),
        Err(e) => error_response(e, req.stage.plausible_causes()),
    }
}

fn products_body(products: Vec<Product>) -> ProductsResponse {
    let note = products
        .is_empty()
        .then_some("No products yet. Register one!");
    ProductsResponse {
        count: products.len(),
        note,
        products,
    }
}

fn error_response(err: LedgerError, causes: Vec<String>) -> Response {
    let status = match &err {
        LedgerError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        LedgerError::Rejected(_) | LedgerError::Call(_) => StatusCode::CONFLICT,
        LedgerError::Connect(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let kind = match &err {
        LedgerError::Rejected(r) => Some(r.kind()),
        LedgerError::Call(_) => Some("rejected"),
        _ => None,
    };
    // The plausible-cause list only helps when the real reason stayed opaque.
    let undiagnosed = matches!(
        &err,
        LedgerError::Call(_) | LedgerError::Rejected(Rejection::Reverted(_))
    );
    let causes = (undiagnosed && !causes.is_empty()).then_some(causes);

    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            kind,
            causes,
        }),
    )
        .into_response()
}
