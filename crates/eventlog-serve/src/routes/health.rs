//! Health check endpoint.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use eventlog_ingest::WriterHealth;
use serde::Serialize;

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    writer: &'static str,
}

/// Public health check endpoint.
///
/// Use this for load balancer health probes: it answers 503 once the writer
/// has failed or stopped.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let writer = state.writer_health();
    let (code, status) = match writer {
        WriterHealth::Healthy => (StatusCode::OK, "ok"),
        WriterHealth::Failed | WriterHealth::Stopped => {
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    };

    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            writer: writer.as_str(),
        }),
    )
}
