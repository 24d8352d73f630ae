//! HTTP surface: webhook and health endpoints.
//!
//! ```text
//! GET  /healthz             → {"status":"ok"}            always
//! POST /paperless-webhook   → {"status":"ok","doc_id":N} after write-back
//!                           → {"status":"error","stage":..,"detail":..} otherwise
//! ```
//!
//! The handler awaits the whole pipeline before answering, so the HTTP
//! status tells Paperless whether the document was enriched.

use crate::document::WebhookEvent;
use crate::enrich::Enricher;
use crate::error::PipelineError;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub const WEBHOOK_PATH: &str = "/paperless-webhook";
pub const HEALTH_PATH: &str = "/healthz";

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!("Webhook failed at {}: {}", self.stage(), self);
        } else {
            warn!("Webhook rejected at {}: {}", self.stage(), self);
        }
        let body = Json(json!({
            "status": "error",
            "stage": self.stage(),
            "detail": self.to_string(),
        }));
        (status, body).into_response()
    }
}

/// Build the router around a shared pipeline.
pub fn router(enricher: Arc<Enricher>) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(health_check))
        .route(WEBHOOK_PATH, post(paperless_webhook))
        .with_state(enricher)
        .layer(TraceLayer::new_for_http())
}

/// Serve until Ctrl-C or SIGTERM.
pub async fn serve(listener: TcpListener, enricher: Arc<Enricher>) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Listening on http://{}", addr);
    }
    axum::serve(listener, router(enricher))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn paperless_webhook(
    State(enricher): State<Arc<Enricher>>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, PipelineError> {
    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| PipelineError::InvalidPayload(e.to_string()))?;
    let (doc_id, _) = enricher.enrich(event.reference()).await?;
    Ok(Json(json!({ "status": "ok", "doc_id": doc_id.get() })))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
