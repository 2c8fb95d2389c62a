//! Secret types for protecting sensitive values from accidental logging.
//!
//! This module re-exports types from the [`secrecy`] crate. The LiveKit API
//! secret is the only long-lived secret in the service; it signs every access
//! credential and every RoomService request, so it must never reach a log line.
//!
//! `SecretString` implements `Debug` with redaction, so any struct that derives
//! `Debug` and holds a `SecretString` is safe to log with `{:?}` or `tracing`.
//! The value is zeroized on drop.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct ApiCredentials {
//!     api_key: String,
//!     api_secret: SecretString,
//! }
//!
//! let creds = ApiCredentials {
//!     api_key: "devkey".to_string(),
//!     api_secret: SecretString::from("secret"),
//! };
//!
//! // The secret is redacted in Debug output
//! assert!(!format!("{creds:?}").contains("\"secret\""));
//!
//! // Signing code must opt in explicitly
//! let raw: &str = creds.api_secret.expose_secret();
//! assert_eq!(raw, "secret");
//! ```

pub use secrecy::{ExposeSecret, SecretString};

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("livekit-api-secret");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("livekit-api-secret"));
    }

    #[test]
    fn test_expose_secret_returns_inner_value() {
        let secret = SecretString::from("signing-secret");
        assert_eq!(secret.expose_secret(), "signing-secret");
    }

    #[test]
    fn test_deserialized_api_credentials_stay_redacted() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct ApiCredentials {
            api_key: String,
            api_secret: SecretString,
        }

        let json = r#"{"api_key": "APIabc123", "api_secret": "very-secret-value"}"#;
        let creds: ApiCredentials = serde_json::from_str(json).expect("deserialize");

        assert_eq!(creds.api_secret.expose_secret(), "very-secret-value");

        let debug = format!("{creds:?}");
        assert!(debug.contains("APIabc123"));
        assert!(!debug.contains("very-secret-value"));
    }
}
