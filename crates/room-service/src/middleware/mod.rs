//! Middleware for the room service.
//!
//! - `http_metrics` - HTTP request metrics for every response

pub mod http_metrics;

pub use http_metrics::http_metrics_middleware;
