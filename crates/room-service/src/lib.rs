//! Room Service Library
//!
//! A room registry and credential issuer in front of a LiveKit server:
//!
//! - Room lifecycle (create, look up, delete) mirrored onto LiveKit
//! - A local room cache reconciled against LiveKit, which is authoritative
//! - Occupancy refresh on every lookup, with capacity enforced at join time
//! - Room-scoped LiveKit access tokens for joining participants
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> registry -> services/video_client.rs
//!                                 \-> services/credential_issuer.rs
//! ```
//!
//! Every registry call runs under a [`context::CallContext`] whose token is a
//! child of the process shutdown token.
//!
//! # Modules
//!
//! - `config` - Service configuration from environment
//! - `context` - Cancellation and deadline handling for registry calls
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - HTTP metrics middleware
//! - `models` - Room metadata and request/response bodies
//! - `observability` - Prometheus metrics
//! - `registry` - Room cache and reconciliation
//! - `routes` - Axum router setup
//! - `services` - Credential issuer and video service clients

pub mod config;
pub mod context;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod registry;
pub mod routes;
pub mod services;
