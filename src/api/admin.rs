//! Admin API handlers: the reconciliation trigger and locked exchange review.
//!
//! Both routes require `Authorization: Bearer <RECONCILE_SECRET>`.

use std::sync::Arc;

use axum::{Json, extract::State, http::HeaderMap};
use secrecy::ExposeSecret;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::app::AppState;
use crate::domain::{AppError, ConfigError, ExchangeView, ReconciliationReport};

use super::handlers::bearer_token;

/// Compare fixed-length digests without short-circuiting on the first mismatch
fn secrets_match(given: &str, expected: &str) -> bool {
    let given = Sha256::digest(given.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    given
        .iter()
        .zip(expected.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let secret = state
        .reconcile_secret
        .as_ref()
        .ok_or(AppError::Config(ConfigError::MissingReconcileSecret))?;

    let token = bearer_token(headers)
        .ok_or_else(|| AppError::Authentication("Missing bearer token".to_string()))?;

    if !secrets_match(token, secret.expose_secret()) {
        warn!("Admin request with invalid bearer token");
        return Err(AppError::Authentication("Invalid bearer token".to_string()));
    }
    Ok(())
}

/// Run reconciliation over every locked exchange
///
/// Intended for an external scheduler. Each locked exchange is reported as
/// `unlocked`, `still_locked` or `error`; one failure never stops the run.
#[utoipa::path(
    post,
    path = "/admin/reconcile",
    tag = "admin",
    responses(
        (status = 200, description = "Reconciliation report", body = ReconciliationReport),
        (status = 401, description = "Missing or invalid bearer token", body = crate::domain::ErrorResponse),
        (status = 500, description = "Secret not configured or store unavailable", body = crate::domain::ErrorResponse),
    )
)]
pub async fn reconcile_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ReconciliationReport>, AppError> {
    authorize(&state, &headers)?;

    let report = state.reconciliation.reconcile_locked_exchanges().await?;
    info!(processed = report.processed, "Reconciliation triggered over HTTP");
    Ok(Json(report))
}

/// List exchanges currently held pending verification
#[utoipa::path(
    get,
    path = "/admin/exchanges/locked",
    tag = "admin",
    responses(
        (status = 200, description = "Locked exchanges, oldest first", body = Vec<ExchangeView>),
        (status = 401, description = "Missing or invalid bearer token", body = crate::domain::ErrorResponse),
    )
)]
pub async fn list_locked_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<ExchangeView>>, AppError> {
    authorize(&state, &headers)?;
    Ok(Json(state.service.list_locked().await?))
}
