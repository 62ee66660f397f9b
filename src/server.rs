//! Webhook server: runs a translation job for each document-change event.

use crate::error::JobError;
use crate::security::{verify_webhook_secret, WEBHOOK_SECRET_HEADER};
use crate::translation::{FamilyLocks, SourceDocument, TranslationCoordinator};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub struct AppState {
    pub coordinator: Arc<TranslationCoordinator>,
    pub locks: FamilyLocks,
    pub webhook_secret: String,
    /// Cancelled on shutdown; running jobs stop and release their permits
    pub shutdown: CancellationToken,
}

/// Document-change event; `data` is the changed document
#[derive(Debug, Deserialize)]
pub struct TranslateEvent {
    #[serde(default)]
    pub data: Option<SourceDocument>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/webhook/translate", post(translate_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `state.shutdown` is cancelled
pub async fn serve(port: u16, state: Arc<AppState>) -> Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Webhook server listening on {}", addr);

    let shutdown = state.shutdown.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("Webhook server failed")?;

    info!("Webhook server stopped");
    Ok(())
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}

async fn translate_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let presented = headers
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|value| value.to_str().ok());
    if !verify_webhook_secret(&state.webhook_secret, presented) {
        warn!("Rejected translate webhook with missing or invalid secret");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid webhook secret" })),
        )
            .into_response();
    }

    let event: TranslateEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!("Rejected malformed translate webhook: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("invalid event body: {}", e) })),
            )
                .into_response();
        }
    };

    let Some(document) = event.data else {
        info!("Translate webhook carried no document, nothing to do");
        return StatusCode::NO_CONTENT.into_response();
    };

    info!("Translate webhook for {}", document.id);
    let _family = state.locks.lock(&document.id).await;

    match state
        .coordinator
        .run_until_cancelled(&document, &state.shutdown)
        .await
    {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(e) => {
            let status = match &e {
                JobError::UnsupportedSourceLanguage(_) => StatusCode::UNPROCESSABLE_ENTITY,
                JobError::Store(_) => StatusCode::BAD_GATEWAY,
                JobError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            };
            (status, Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}
