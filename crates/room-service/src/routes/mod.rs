//! HTTP routes for the room service.
//!
//! Defines the Axum router and application state.

use crate::config::Config;
use crate::context::CallContext;
use crate::handlers;
use crate::middleware::http_metrics_middleware;
use crate::registry::RoomRegistry;
use crate::services::{CredentialIssuer, VideoServiceClient};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Slack added to the registry deadline for the outer HTTP timeout, so the
/// registry reports `DEADLINE_EXCEEDED` before the layer answers 408.
const HTTP_TIMEOUT_SLACK: Duration = Duration::from_secs(5);

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Room cache reconciled against the video service.
    pub registry: Arc<RoomRegistry>,

    /// Participant credential issuer.
    pub issuer: Arc<CredentialIssuer>,

    /// Video service client, used directly by the readiness probe.
    pub video_client: Arc<dyn VideoServiceClient>,

    /// Cancelled when the server starts shutting down.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Context for one request: a child of the shutdown token, bounded by the
    /// configured request timeout.
    pub fn call_context(&self) -> CallContext {
        CallContext::with_timeout(self.shutdown.child_token(), self.config.request_timeout())
    }
}

/// Build the application routes.
///
/// - `/health` - Liveness probe
/// - `/ready` - Readiness probe (lists rooms on the video service)
/// - `/metrics` - Prometheus metrics endpoint
/// - `/api/v1/rooms` - Create / list rooms
/// - `/api/v1/rooms/:id` - Get / delete a room
/// - `/api/v1/rooms/:id/join` - Join a room
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - Request timeout of the registry deadline plus slack
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let http_timeout = state.config.request_timeout() + HTTP_TIMEOUT_SLACK;

    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route(
            "/api/v1/rooms",
            post(handlers::create_room).get(handlers::list_rooms),
        )
        .route(
            "/api/v1/rooms/:id",
            get(handlers::get_room).delete(handlers::delete_room),
        )
        .route("/api/v1/rooms/:id/join", post(handlers::join_room))
        .with_state(state);

    // Metrics route with its own state
    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    with_global_layers(api_routes.merge(metrics_routes), http_timeout)
}

/// Apply the layers shared by every route.
///
/// The last `.layer` call is outermost:
/// 1. TimeoutLayer (innermost)
/// 2. TraceLayer, logs timed-out requests too
/// 3. http_metrics_middleware (outermost), sees every response
fn with_global_layers(router: Router, http_timeout: Duration) -> Router {
    router
        .layer(TimeoutLayer::new(http_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(http_metrics_middleware))
}
