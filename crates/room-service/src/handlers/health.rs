//! Health check handlers.
//!
//! - `/health`: liveness, answers while the process is serving
//! - `/ready`: readiness, probes the video service with a room listing

use crate::models::{HealthResponse, ReadinessResponse};
use crate::routes::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use std::sync::Arc;

/// Service name reported by `/health`.
pub const SERVICE_NAME: &str = "room-service";

/// Liveness probe handler.
///
/// Does not touch any dependency.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: SERVICE_NAME,
        timestamp: Utc::now(),
    })
}

/// Readiness probe handler.
///
/// Returns 200 when the video service answers a room listing within the
/// request deadline, 503 otherwise.
///
/// ## Security
///
/// The response error is generic. The actual failure is logged.
#[tracing::instrument(skip_all, name = "rs.health.readiness")]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let ctx = state.call_context();
    let probe = ctx.run("readiness", state.video_client.list_rooms()).await;

    let failure = match probe {
        Ok(Ok(_)) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(e) => Some(e.to_string()),
    };

    match failure {
        None => (
            StatusCode::OK,
            Json(ReadinessResponse {
                status: "ready",
                livekit: Some("healthy"),
                error: None,
            }),
        ),
        Some(reason) => {
            tracing::warn!(target: "rs.health", error = %reason, "Readiness check failed: video service unreachable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadinessResponse {
                    status: "not_ready",
                    livekit: Some("unavailable"),
                    error: Some("Service dependencies unavailable".to_string()),
                }),
            )
        }
    }
}
