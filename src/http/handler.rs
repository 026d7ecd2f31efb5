//! Main axum router and HTTP request handlers for the mod gate.
//!
//! Routes:
//! - `POST /check_mod`         - Access check for one mod
//! - `GET  /mods_list`         - All mods with versions and a change digest
//! - `GET  /download/{*path}`  - Streamed file pass-through
//! - `GET  /healthz`           - Health check
//! - `GET  /metrics`           - Prometheus metrics

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use bytes::Bytes;
use serde::Deserialize;
use tracing::{debug, error, instrument};

use crate::AppState;
use crate::access::{self, Denial, Verdict};
use crate::listing::{self, Listing};
use crate::metrics::{CheckOutcome, DownloadOutcome};
use crate::relay::{self, FALLBACK_CONTENT_TYPE, RelayError};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the axum [`Router`] with all HTTP routes and shared state.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/check_mod", post(handle_check_mod))
        .route("/mods_list", get(handle_mods_list))
        .route("/download/{*path}", get(handle_download))
        // Health, metrics
        .route("/healthz", get(crate::health::health_handler))
        .route("/metrics", get(handle_metrics))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CheckModRequest {
    #[serde(default)]
    game: Option<String>,
    #[serde(default)]
    tier: Option<String>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `POST /check_mod`
///
/// Body `{"game": "...", "tier": "..."}`.  Answers with the access verdict;
/// denials carry 400, 403 or 404 depending on the reason.
#[instrument(skip(state, body))]
async fn handle_check_mod(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Verdict>, AppError> {
    let result = check_mod(&state, &body).await;

    state.metrics.metrics.record_check(match &result {
        Ok(_) => CheckOutcome::Granted,
        Err(denial) => check_outcome(*denial),
    });

    result.map(Json).map_err(AppError::Access)
}

async fn check_mod(state: &AppState, body: &[u8]) -> Result<Verdict, Denial> {
    let request: CheckModRequest = serde_json::from_slice(body).map_err(|e| {
        debug!(error = %e, "malformed check_mod body");
        Denial::MalformedRequest
    })?;
    let game = request.game.ok_or(Denial::MissingGame)?;

    let manifest = state.resolver.resolve(&game).await;
    let verdict = access::evaluate(manifest.as_ref(), request.tier.as_deref());

    match verdict.error {
        Some(denial) => {
            debug!(%game, %denial, "access denied");
            Err(denial)
        }
        None => Ok(verdict),
    }
}

/// `GET /mods_list`
///
/// Best-effort listing; always 200.
#[instrument(skip(state))]
async fn handle_mods_list(State(state): State<Arc<AppState>>) -> Json<Listing> {
    let listing = listing::list_bundles(
        state.store.as_ref(),
        &state.resolver,
        state.config.listing.concurrency,
    )
    .await;

    let metrics = &state.metrics.metrics;
    metrics.listing_requests_total.inc();
    metrics.listing_bundles.set(listing.mods.len() as i64);

    Json(listing)
}

/// `GET /download/{*path}`
///
/// Streams the file from the content store with the origin's content type.
#[instrument(skip(state))]
async fn handle_download(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<Response, AppError> {
    let metrics = &state.metrics.metrics;

    let object = match relay::relay(state.store.as_ref(), &path).await {
        Ok(object) => object,
        Err(RelayError::InvalidPath(reason)) => {
            metrics.record_download(DownloadOutcome::Rejected);
            return Err(AppError::InvalidPath(reason));
        }
        Err(RelayError::NotFound) => {
            metrics.record_download(DownloadOutcome::NotFound);
            return Err(AppError::FileNotFound);
        }
    };
    metrics.record_download(DownloadOutcome::Streamed);

    let content_type = object
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
        .unwrap_or_else(|| HeaderValue::from_static(FALLBACK_CONTENT_TYPE));

    // Stream the upstream body back to the client without buffering.
    let mut response = Response::new(Body::from_stream(object.body));
    *response.status_mut() = StatusCode::OK;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, content_type);
    if let Some(len) = object.content_length {
        response
            .headers_mut()
            .insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    }

    Ok(response)
}

/// `GET /metrics`
///
/// Returns Prometheus metrics collected by the proxy.
async fn handle_metrics(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let buf = state
        .metrics
        .encode()
        .map_err(|e| AppError::Internal(anyhow::anyhow!("metrics encoding failed: {e}")))?;

    Ok((
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        buf,
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn check_outcome(denial: Denial) -> CheckOutcome {
    match denial {
        Denial::MissingGame | Denial::MalformedRequest => CheckOutcome::BadRequest,
        Denial::NotFound => CheckOutcome::NotFound,
        Denial::InvalidTier => CheckOutcome::InvalidTier,
        Denial::TierLocked => CheckOutcome::TierLocked,
    }
}

fn denial_status(denial: Denial) -> StatusCode {
    match denial {
        Denial::MissingGame | Denial::MalformedRequest => StatusCode::BAD_REQUEST,
        Denial::NotFound => StatusCode::NOT_FOUND,
        Denial::InvalidTier | Denial::TierLocked => StatusCode::FORBIDDEN,
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Application-level error type that maps cleanly to HTTP responses.
///
/// Every variant renders a JSON body.
#[derive(Debug)]
pub enum AppError {
    /// The access check refused the caller.
    Access(Denial),
    /// The download path was rejected before contacting the store.
    InvalidPath(String),
    /// The store has no such file or could not be reached.
    FileNotFound,
    /// An unexpected internal error.
    Internal(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Access(denial) => {
                (denial_status(denial), Json(Verdict::denied(denial))).into_response()
            }
            AppError::InvalidPath(detail) => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "Invalid path", "detail": detail})),
            )
                .into_response(),
            AppError::FileNotFound => (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({"error": "File not found"})),
            )
                .into_response(),
            AppError::Internal(err) => {
                error!(error = %err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({"error": "Internal server error"})),
                )
                    .into_response()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
