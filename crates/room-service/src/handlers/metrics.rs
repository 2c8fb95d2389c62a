//! Prometheus metrics endpoint handler.
//!
//! The endpoint is unauthenticated so Prometheus can scrape it. Labels are
//! bounded and never carry room ids or participant identities.

use axum::{extract::State, response::IntoResponse};
use metrics_exporter_prometheus::PrometheusHandle;

/// Handler for GET /metrics
///
/// Returns Prometheus text format:
/// ```text
/// # TYPE rs_http_requests_total counter
/// rs_http_requests_total{method="POST",endpoint="/api/v1/rooms",status_code="201"} 3
/// ```
#[tracing::instrument(skip_all, name = "rs.metrics.scrape")]
pub async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}
