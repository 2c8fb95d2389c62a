//! Test server harness for E2E testing
//!
//! Provides `TestRoomServer` for spawning real room service instances backed by
//! an in-memory video service.

use room_service::config::Config;
use room_service::observability::metrics::configured_builder;
use room_service::registry::RoomRegistry;
use room_service::routes::{self, AppState};
use room_service::services::video_client::mock::MockVideoService;
use room_service::services::CredentialIssuer;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// LiveKit API key used by every test server.
pub const TEST_API_KEY: &str = "APItestkey";

/// LiveKit API secret used by every test server.
pub const TEST_API_SECRET: &str = "test-secret-at-least-32-bytes-long!";

/// LiveKit URL returned by the join endpoint of every test server.
pub const TEST_LIVEKIT_URL: &str = "wss://livekit.test.example.com";

/// Public base URL used to build join links.
pub const TEST_PUBLIC_BASE_URL: &str = "https://rooms.test.example.com";

/// Test harness for spawning the room service in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_create_room_e2e() -> Result<(), anyhow::Error> {
///     let mock = Arc::new(MockVideoService::new());
///     let server = TestRoomServer::spawn(mock.clone()).await?;
///
///     let response = reqwest::Client::new()
///         .post(format!("{}/api/v1/rooms", server.url()))
///         .send()
///         .await?;
///
///     assert_eq!(response.status(), 201);
///     assert_eq!(mock.create_calls(), 1);
///     Ok(())
/// }
/// ```
pub struct TestRoomServer {
    addr: SocketAddr,
    config: Config,
    registry: Arc<RoomRegistry>,
    shutdown: CancellationToken,
    _handle: JoinHandle<()>,
}

impl TestRoomServer {
    /// Spawn a server with the default test configuration.
    pub async fn spawn(mock: Arc<MockVideoService>) -> Result<Self, anyhow::Error> {
        Self::spawn_with_vars(mock, HashMap::new()).await
    }

    /// Spawn a server, overriding configuration variables with `overrides`.
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Use a detached Prometheus recorder, so several servers can run in
    ///   one process
    /// - Start the HTTP server in the background
    pub async fn spawn_with_vars(
        mock: Arc<MockVideoService>,
        overrides: HashMap<String, String>,
    ) -> Result<Self, anyhow::Error> {
        let mut vars = HashMap::from([
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            ("ENVIRONMENT".to_string(), "test".to_string()),
            ("LIVEKIT_URL".to_string(), TEST_LIVEKIT_URL.to_string()),
            ("LIVEKIT_API_KEY".to_string(), TEST_API_KEY.to_string()),
            ("LIVEKIT_API_SECRET".to_string(), TEST_API_SECRET.to_string()),
            (
                "PUBLIC_BASE_URL".to_string(),
                TEST_PUBLIC_BASE_URL.to_string(),
            ),
        ]);
        vars.extend(overrides);

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let metrics_handle = configured_builder()
            .map_err(|e| anyhow::anyhow!("Failed to build metrics recorder: {}", e))?
            .build_recorder()
            .handle();

        let issuer = Arc::new(CredentialIssuer::new(
            config.livekit_api_key.clone(),
            config.livekit_api_secret.clone(),
        ));
        let registry = Arc::new(RoomRegistry::new(
            mock.clone(),
            config.default_max_participants,
        ));
        let shutdown = CancellationToken::new();

        let state = Arc::new(AppState {
            config: config.clone(),
            registry: registry.clone(),
            issuer,
            video_client: mock,
            shutdown: shutdown.clone(),
        });

        // Build routes using room-service's real route builder
        let app = routes::build_routes(state, metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            registry,
            shutdown,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The registry behind the server, for inspecting cache state.
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Cancel the shutdown token, as a SIGTERM would.
    pub fn begin_shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for TestRoomServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}
