//! # Room Service Test Utilities
//!
//! Shared test utilities for the room service.
//!
//! This crate provides:
//! - Server test harness (`TestRoomServer` for E2E tests against the real
//!   router and an in-memory video service)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use room_test_utils::*;
//! use room_service::services::video_client::mock::MockVideoService;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<(), anyhow::Error> {
//!     let mock = Arc::new(MockVideoService::new());
//!     let server = TestRoomServer::spawn(mock).await?;
//!
//!     let response = reqwest::get(format!("{}/health", server.url())).await?;
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod server_harness;

// Re-export commonly used items
pub use server_harness::*;
