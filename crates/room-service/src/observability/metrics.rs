//! Metrics definitions for the room service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `rs_` prefix for the room service
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `method`: HTTP methods, or the four RoomService RPC names
//! - `endpoint`: parameterized paths (room ids replaced with `{id}`)
//! - `status`: success, error, timeout
//! - `operation`: create_room, get_room, delete_room, list_rooms
//! - `error_type`: bounded by error variants
//!
//! Room ids and participant identities are never used as labels.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    configured_builder()?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

/// Builder with the service's histogram buckets applied.
///
/// Test harnesses call `build_recorder()` on this to get a handle without
/// installing a global recorder.
pub fn configured_builder() -> Result<PrometheusBuilder, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("rs_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("rs_livekit_request".to_string()),
            &[
                0.010, 0.025, 0.050, 0.100, 0.200, 0.500, 1.000, 2.000, 5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set LiveKit request buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("rs_registry_operation".to_string()),
            &[
                0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 5.000,
            ],
        )
        .map_err(|e| format!("Failed to set registry operation buckets: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `rs_http_requests_total`, `rs_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("rs_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint.clone(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("rs_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/error/timeout
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Normalize endpoint path to prevent label cardinality explosion
fn normalize_endpoint(path: &str) -> String {
    match path {
        "/" => "/".to_string(),
        "/health" => "/health".to_string(),
        "/ready" => "/ready".to_string(),
        "/metrics" => "/metrics".to_string(),
        "/api/v1/rooms" => "/api/v1/rooms".to_string(),
        _ => normalize_dynamic_endpoint(path),
    }
}

/// Replaces room ids with placeholders.
fn normalize_dynamic_endpoint(path: &str) -> String {
    if path.starts_with("/api/v1/rooms/") {
        let parts: Vec<&str> = path.split('/').collect();

        // /api/v1/rooms/{id} → parts.len() == 5
        if parts.len() == 5 {
            return "/api/v1/rooms/{id}".to_string();
        }

        // /api/v1/rooms/{id}/join → parts.len() == 6
        if parts.len() == 6 && parts.get(5) == Some(&"join") {
            return "/api/v1/rooms/{id}/join".to_string();
        }
    }

    // Unknown paths normalized to "/other" to bound cardinality
    "/other".to_string()
}

// ============================================================================
// Registry Metrics
// ============================================================================

/// Record a registry operation outcome.
///
/// Metric: `rs_registry_operations_total`, `rs_registry_operation_duration_seconds`
/// Labels: `operation`, `status`, `error_type`
pub fn record_registry_operation(
    operation: &str,
    status: &str,
    error_type: Option<&str>,
    duration: Duration,
) {
    histogram!("rs_registry_operation_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("rs_registry_operations_total",
        "operation" => operation.to_string(),
        "status" => status.to_string(),
        "error_type" => error_type.unwrap_or("none").to_string()
    )
    .increment(1);
}

/// Record a swallowed occupancy refresh failure.
///
/// Metric: `rs_occupancy_refresh_failures_total`
/// Labels: `error_type`
pub fn record_refresh_failure(error_type: &str) {
    counter!("rs_occupancy_refresh_failures_total",
        "error_type" => error_type.to_string()
    )
    .increment(1);
}

/// Record whether a get was served from the cache or fell back to the listing.
///
/// Metric: `rs_registry_cache_lookups_total`
/// Labels: `result` (hit, miss)
pub fn record_cache_lookup(hit: bool) {
    counter!("rs_registry_cache_lookups_total",
        "result" => if hit { "hit" } else { "miss" }
    )
    .increment(1);
}

/// Set the number of cached rooms.
///
/// Metric: `rs_rooms_cached`
pub fn set_cached_rooms(count: usize) {
    gauge!("rs_rooms_cached").set(count as f64);
}

// ============================================================================
// Credential Metrics
// ============================================================================

/// Record credential issuance.
///
/// Metric: `rs_credentials_issued_total`
/// Labels: `kind` (participant, service), `status`
pub fn record_credential_issued(kind: &str, status: &str) {
    counter!("rs_credentials_issued_total",
        "kind" => kind.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

// ============================================================================
// LiveKit Client Metrics
// ============================================================================

/// Record a LiveKit RoomService call.
///
/// Metric: `rs_livekit_requests_total`, `rs_livekit_request_duration_seconds`
/// Labels: `method`, `status`
pub fn record_livekit_request(method: &str, status: &str, duration: Duration) {
    histogram!("rs_livekit_request_duration_seconds",
        "method" => method.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("rs_livekit_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

// ============================================================================
// Tests
// ============================================================================
