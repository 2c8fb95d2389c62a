//! HTTP metrics middleware.
//!
//! Records every response, including the ones produced before a handler
//! runs (unknown route 404, 405 Method Not Allowed, timeout 408).

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::observability::metrics::record_http_request;

/// Records method, normalized path, status code and duration.
///
/// Applied as the outermost layer.
pub async fn http_metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    record_http_request(&method, &path, response.status().as_u16(), start.elapsed());

    response
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request as HttpRequest, StatusCode},
        middleware,
        routing::{delete, get},
        Router,
    };
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};
    use tower::ServiceExt;

    async fn handler_200() -> &'static str {
        "OK"
    }

    async fn handler_502() -> (StatusCode, &'static str) {
        (StatusCode::BAD_GATEWAY, "Upstream failed")
    }

    fn test_app() -> Router {
        Router::new()
            .route("/health", get(handler_200))
            .route("/api/v1/rooms/:id", delete(handler_502))
            .layer(middleware::from_fn(http_metrics_middleware))
    }

    /// Send `requests` through the app on a current-thread runtime so the
    /// thread-local recorder sees every metric, and return the
    /// `rs_http_requests_total` samples as (endpoint, status_code, count).
    fn recorded_requests(requests: Vec<(&'static str, &'static str)>) -> Vec<(String, String, u64)> {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async {
                for (method, uri) in requests {
                    let request = HttpRequest::builder()
                        .method(method)
                        .uri(uri)
                        .body(Body::empty())
                        .unwrap();
                    test_app().oneshot(request).await.unwrap();
                }
            });
        });

        snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .filter(|(key, _, _, _)| key.key().name() == "rs_http_requests_total")
            .map(|(key, _, _, value)| {
                let label = |name: &str| {
                    key.key()
                        .labels()
                        .find(|l| l.key() == name)
                        .map(|l| l.value().to_string())
                        .unwrap_or_default()
                };
                let count = match value {
                    DebugValue::Counter(v) => v,
                    _ => 0,
                };
                (label("endpoint"), label("status_code"), count)
            })
            .collect()
    }

    #[test]
    fn test_middleware_records_success() {
        let samples = recorded_requests(vec![("GET", "/health"), ("GET", "/health")]);

        assert_eq!(samples, vec![("/health".to_string(), "200".to_string(), 2)]);
    }

    #[test]
    fn test_middleware_records_handler_error_with_normalized_path() {
        let samples = recorded_requests(vec![("DELETE", "/api/v1/rooms/ABC123")]);

        assert_eq!(
            samples,
            vec![("/api/v1/rooms/{id}".to_string(), "502".to_string(), 1)]
        );
    }

    #[test]
    fn test_middleware_records_unrouted_requests() {
        let samples = recorded_requests(vec![("GET", "/nonexistent"), ("POST", "/health")]);

        assert!(samples.contains(&("/other".to_string(), "404".to_string(), 1)));
        assert!(samples.contains(&("/health".to_string(), "405".to_string(), 1)));
    }
}
