//! Room Service
//!
//! Entry point for the LiveKit room registry and credential issuer.

use room_service::config::Config;
use room_service::observability::metrics::init_metrics_recorder;
use room_service::registry::RoomRegistry;
use room_service::routes::{self, AppState};
use room_service::services::{CredentialIssuer, LiveKitClient, VideoServiceClient};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "room_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Room Service");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        environment = %config.environment,
        bind_address = %config.bind_address,
        livekit_url = %config.livekit_url,
        request_timeout_seconds = config.request_timeout_seconds,
        default_max_participants = config.default_max_participants,
        "Configuration loaded successfully"
    );

    // Initialize Prometheus metrics recorder
    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics recorder: {}", e);
        e
    })?;

    let issuer = Arc::new(CredentialIssuer::new(
        config.livekit_api_key.clone(),
        config.livekit_api_secret.clone(),
    ));

    let livekit_api_url = config.livekit_api_url().map_err(|e| {
        error!("Invalid LiveKit URL: {}", e);
        e
    })?;
    let video_client: Arc<dyn VideoServiceClient> = Arc::new(
        LiveKitClient::new(livekit_api_url, issuer.clone(), config.livekit_timeout()).map_err(
            |e| {
                error!("Failed to create LiveKit client: {}", e);
                e
            },
        )?,
    );

    let registry = Arc::new(RoomRegistry::new(
        video_client.clone(),
        config.default_max_participants,
    ));

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;
    let drain_seconds = config.drain_seconds;

    let shutdown = CancellationToken::new();
    let state = Arc::new(AppState {
        config,
        registry,
        issuer,
        video_client,
        shutdown: shutdown.clone(),
    });

    let app = routes::build_routes(state, metrics_handle);

    info!("Room Service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown, drain_seconds))
        .await?;

    info!("Room Service shutdown complete");

    Ok(())
}

/// Waits for SIGINT or SIGTERM, cancels `shutdown` so in-flight registry
/// calls stop, then sleeps for the drain period.
async fn shutdown_signal(shutdown: CancellationToken, drain_seconds: u64) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    shutdown.cancel();

    if drain_seconds > 0 {
        warn!("Draining connections for {} seconds...", drain_seconds);
        tokio::time::sleep(Duration::from_secs(drain_seconds)).await;
        info!("Drain period complete");
    } else {
        info!("Skipping drain period (DRAIN_SECONDS=0)");
    }
}
