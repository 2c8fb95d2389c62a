//! Room service configuration.
//!
//! Configuration is loaded from environment variables. The LiveKit API
//! secret is redacted in Debug output.

use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default deployment environment.
pub const DEFAULT_ENVIRONMENT: &str = "development";

/// Default LiveKit server URL handed to clients.
pub const DEFAULT_LIVEKIT_URL: &str = "ws://localhost:7880";

/// Development-only LiveKit API key (matches `livekit-server --dev`).
pub const DEV_LIVEKIT_API_KEY: &str = "devkey";

/// Development-only LiveKit API secret (matches `livekit-server --dev`).
pub const DEV_LIVEKIT_API_SECRET: &str = "secret";

/// Default public base URL used to build room join links.
pub const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:8080";

/// Default per-request deadline for registry operations.
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 15;

/// Upper bound for `REQUEST_TIMEOUT_SECONDS`.
pub const MAX_REQUEST_TIMEOUT_SECONDS: u64 = 300;

/// Default HTTP timeout for LiveKit API calls.
pub const DEFAULT_LIVEKIT_TIMEOUT_SECONDS: u64 = 10;

/// Capacity assigned to rooms created without an explicit limit.
pub const DEFAULT_MAX_PARTICIPANTS: u32 = 20;

/// Room service configuration.
///
/// Loaded from environment variables with development-friendly defaults.
#[derive(Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Deployment environment ("development", "staging", "production", ...).
    pub environment: String,

    /// LiveKit server URL returned to joining clients (default: "ws://localhost:7880").
    pub livekit_url: String,

    /// LiveKit API key. Used as the `iss` claim of every token.
    pub livekit_api_key: String,

    /// LiveKit API secret used to sign tokens.
    /// Protected by `SecretString` to prevent accidental logging.
    pub livekit_api_secret: SecretString,

    /// Public base URL of this service, used to build `join_url`.
    pub public_base_url: String,

    /// Deadline applied to each registry call made on behalf of a request.
    pub request_timeout_seconds: u64,

    /// HTTP timeout for calls to the LiveKit RoomService API.
    pub livekit_timeout_seconds: u64,

    /// Capacity used when a create request omits it or sends 0.
    pub default_max_participants: u32,

    /// Graceful shutdown drain period in seconds.
    pub drain_seconds: u64,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("environment", &self.environment)
            .field("livekit_url", &self.livekit_url)
            .field("livekit_api_key", &self.livekit_api_key)
            .field("livekit_api_secret", &"[REDACTED]")
            .field("public_base_url", &self.public_base_url)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .field("livekit_timeout_seconds", &self.livekit_timeout_seconds)
            .field("default_max_participants", &self.default_max_participants)
            .field("drain_seconds", &self.drain_seconds)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid LiveKit URL: {0}")]
    InvalidLiveKitUrl(String),

    #[error("Invalid timeout configuration: {0}")]
    InvalidTimeout(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        // BIND_ADDRESS wins; a bare PORT is honoured for container platforms
        let bind_address = match (vars.get("BIND_ADDRESS"), vars.get("PORT")) {
            (Some(addr), _) => addr.clone(),
            (None, Some(port)) => {
                let port: u16 = port.parse().map_err(|e| {
                    ConfigError::InvalidValue(format!(
                        "PORT must be a valid port number, got '{}': {}",
                        port, e
                    ))
                })?;
                format!("0.0.0.0:{}", port)
            }
            (None, None) => DEFAULT_BIND_ADDRESS.to_string(),
        };

        let environment = vars
            .get("ENVIRONMENT")
            .cloned()
            .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string());
        let is_development = environment == DEFAULT_ENVIRONMENT;

        let livekit_url = vars
            .get("LIVEKIT_URL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_LIVEKIT_URL.to_string());

        if api_base_url(&livekit_url).is_none() {
            return Err(ConfigError::InvalidLiveKitUrl(format!(
                "LIVEKIT_URL must start with ws://, wss://, http:// or https://, got '{}'",
                livekit_url
            )));
        }

        // Dev credentials only apply to the development environment
        let livekit_api_key = match vars.get("LIVEKIT_API_KEY") {
            Some(key) if !key.is_empty() => key.clone(),
            _ if is_development => DEV_LIVEKIT_API_KEY.to_string(),
            _ => return Err(ConfigError::MissingEnvVar("LIVEKIT_API_KEY".to_string())),
        };

        let livekit_api_secret = match vars.get("LIVEKIT_API_SECRET") {
            Some(secret) if !secret.is_empty() => SecretString::from(secret.clone()),
            _ if is_development => SecretString::from(DEV_LIVEKIT_API_SECRET),
            _ => {
                return Err(ConfigError::MissingEnvVar(
                    "LIVEKIT_API_SECRET".to_string(),
                ))
            }
        };

        let public_base_url = vars
            .get("PUBLIC_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_PUBLIC_BASE_URL.to_string());

        // Parse request deadline with validation
        let request_timeout_seconds = if let Some(value_str) = vars.get("REQUEST_TIMEOUT_SECONDS")
        {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidTimeout(format!(
                    "REQUEST_TIMEOUT_SECONDS must be a valid positive integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidTimeout(
                    "REQUEST_TIMEOUT_SECONDS must be greater than 0".to_string(),
                ));
            }

            if value > MAX_REQUEST_TIMEOUT_SECONDS {
                return Err(ConfigError::InvalidTimeout(format!(
                    "REQUEST_TIMEOUT_SECONDS must not exceed {} seconds, got {}",
                    MAX_REQUEST_TIMEOUT_SECONDS, value
                )));
            }

            value
        } else {
            DEFAULT_REQUEST_TIMEOUT_SECONDS
        };

        let livekit_timeout_seconds = if let Some(value_str) = vars.get("LIVEKIT_TIMEOUT_SECONDS")
        {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidTimeout(format!(
                    "LIVEKIT_TIMEOUT_SECONDS must be a valid positive integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidTimeout(
                    "LIVEKIT_TIMEOUT_SECONDS must be greater than 0".to_string(),
                ));
            }

            value
        } else {
            DEFAULT_LIVEKIT_TIMEOUT_SECONDS
        };

        let default_max_participants =
            if let Some(value_str) = vars.get("DEFAULT_MAX_PARTICIPANTS") {
                let value: u32 = value_str.parse().map_err(|e| {
                    ConfigError::InvalidValue(format!(
                        "DEFAULT_MAX_PARTICIPANTS must be a valid positive integer, got '{}': {}",
                        value_str, e
                    ))
                })?;

                if value == 0 {
                    return Err(ConfigError::InvalidValue(
                        "DEFAULT_MAX_PARTICIPANTS must be greater than 0".to_string(),
                    ));
                }

                value
            } else {
                DEFAULT_MAX_PARTICIPANTS
            };

        let drain_seconds = if let Some(value_str) = vars.get("DRAIN_SECONDS") {
            value_str.parse().map_err(|e| {
                ConfigError::InvalidValue(format!(
                    "DRAIN_SECONDS must be a valid non-negative integer, got '{}': {}",
                    value_str, e
                ))
            })?
        } else {
            0
        };

        Ok(Config {
            bind_address,
            environment,
            livekit_url,
            livekit_api_key,
            livekit_api_secret,
            public_base_url,
            request_timeout_seconds,
            livekit_timeout_seconds,
            default_max_participants,
            drain_seconds,
        })
    }

    /// Base URL of the LiveKit HTTP API derived from `livekit_url`.
    pub fn livekit_api_url(&self) -> Result<String, ConfigError> {
        api_base_url(&self.livekit_url)
            .ok_or_else(|| ConfigError::InvalidLiveKitUrl(self.livekit_url.clone()))
    }

    /// Per-request deadline for registry operations.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// HTTP timeout for LiveKit API calls.
    pub fn livekit_timeout(&self) -> Duration {
        Duration::from_secs(self.livekit_timeout_seconds)
    }

    /// Shareable link to a room's page.
    pub fn join_url(&self, room_id: &str) -> String {
        format!("{}/room/{}", self.public_base_url, room_id)
    }
}

/// Map a LiveKit client URL onto its HTTP API base (ws→http, wss→https).
fn api_base_url(url: &str) -> Option<String> {
    let trimmed = url.trim_end_matches('/');
    if let Some(rest) = trimmed.strip_prefix("wss://") {
        Some(format!("https://{}", rest))
    } else if let Some(rest) = trimmed.strip_prefix("ws://") {
        Some(format!("http://{}", rest))
    } else if trimmed.starts_with("https://") || trimmed.starts_with("http://") {
        Some(trimmed.to_string())
    } else {
        None
    }
}
