//! Credential issuer.
//!
//! Mints LiveKit access tokens: participant credentials that bind one
//! identity to one room, and short-lived service tokens the LiveKit client
//! uses to call the RoomService API.
//!
//! The issuer is stateless. The API key and signer are fixed at startup.
//!
//! # Security
//!
//! - Participant grants are `roomJoin` scoped to exactly one room
//! - The API secret is held in a `SecretString` and only exposed to the signer
//! - Identities are logged at debug level only

use crate::errors::RoomError;
use crate::observability::metrics;
use chrono::{DateTime, Utc};
use common::jwt::{AccessClaims, VideoGrant, ACCESS_TOKEN_TTL, SERVICE_TOKEN_TTL};
use common::secret::{ExposeSecret, SecretString};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Signer failure.
#[derive(Debug, Error)]
pub enum SignerError {
    #[error("Token encoding failed: {0}")]
    Encoding(String),
}

/// Turns claims into a signed token.
pub trait TokenSigner: Send + Sync {
    fn sign(&self, claims: &AccessClaims) -> Result<String, SignerError>;
}

/// HS256 signer keyed by the LiveKit API secret.
pub struct Hs256Signer {
    secret: SecretString,
}

impl Hs256Signer {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }
}

impl TokenSigner for Hs256Signer {
    fn sign(&self, claims: &AccessClaims) -> Result<String, SignerError> {
        let key = EncodingKey::from_secret(self.secret.expose_secret().as_bytes());
        encode(&Header::new(Algorithm::HS256), claims, &key)
            .map_err(|e| SignerError::Encoding(e.to_string()))
    }
}

/// Issues participant credentials and RoomService service tokens.
pub struct CredentialIssuer {
    api_key: String,
    signer: Arc<dyn TokenSigner>,
    ttl: Duration,
}

impl CredentialIssuer {
    /// Issuer signing with HS256 under `api_secret`.
    pub fn new(api_key: String, api_secret: SecretString) -> Self {
        Self::with_signer(api_key, Arc::new(Hs256Signer::new(api_secret)))
    }

    /// Issuer with a custom signer.
    pub fn with_signer(api_key: String, signer: Arc<dyn TokenSigner>) -> Self {
        Self {
            api_key,
            signer,
            ttl: ACCESS_TOKEN_TTL,
        }
    }

    /// Issue a credential allowing `identity` to join `room_id`.
    ///
    /// # Errors
    ///
    /// - `RoomError::InvalidArgument` if either argument is empty (the signer
    ///   is not invoked)
    /// - `RoomError::Signing` if encoding fails
    pub fn issue_credential(&self, room_id: &str, identity: &str) -> Result<String, RoomError> {
        self.issue_credential_at(room_id, identity, Utc::now())
    }

    /// Same as [`issue_credential`](Self::issue_credential) with an explicit
    /// issuance time.
    #[instrument(skip_all, name = "rs.credentials.issue", fields(room_id = %room_id))]
    pub fn issue_credential_at(
        &self,
        room_id: &str,
        identity: &str,
        now: DateTime<Utc>,
    ) -> Result<String, RoomError> {
        if room_id.trim().is_empty() {
            metrics::record_credential_issued("participant", "invalid_argument");
            return Err(RoomError::InvalidArgument(
                "Room ID is required".to_string(),
            ));
        }
        if identity.trim().is_empty() {
            metrics::record_credential_issued("participant", "invalid_argument");
            return Err(RoomError::InvalidArgument(
                "Participant identity is required".to_string(),
            ));
        }

        let claims = self.claims(identity, VideoGrant::join(room_id), now, self.ttl);
        let token = self.sign(&claims, "participant")?;

        debug!(
            target: "rs.services.credentials",
            room_id = %room_id,
            identity = %identity,
            jti = %claims.jti,
            "Issued participant credential"
        );

        Ok(token)
    }

    /// Issue a short-lived token for calling the RoomService API.
    pub fn issue_service_token(&self, grant: VideoGrant) -> Result<String, RoomError> {
        let claims = self.claims(&self.api_key, grant, Utc::now(), SERVICE_TOKEN_TTL);
        self.sign(&claims, "service")
    }

    fn claims(
        &self,
        subject: &str,
        video: VideoGrant,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> AccessClaims {
        let iat = now.timestamp();
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);

        AccessClaims {
            iss: self.api_key.clone(),
            sub: subject.to_string(),
            iat,
            nbf: iat,
            exp: iat.saturating_add(ttl_secs),
            jti: Uuid::new_v4().to_string(),
            video,
        }
    }

    fn sign(&self, claims: &AccessClaims, kind: &str) -> Result<String, RoomError> {
        match self.signer.sign(claims) {
            Ok(token) => {
                metrics::record_credential_issued(kind, "success");
                Ok(token)
            }
            Err(e) => {
                warn!(target: "rs.services.credentials", error = %e, kind = kind, "Token signing failed");
                metrics::record_credential_issued(kind, "error");
                Err(RoomError::Signing(format!("issue_{}_token: {}", kind, e)))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::jwt::{decode_claims, DEFAULT_CLOCK_SKEW};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const API_KEY: &str = "APItestkey";
    const API_SECRET: &str = "test-secret-at-least-32-bytes-long!";

    /// Signer that counts invocations and can be told to fail.
    struct CountingSigner {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingSigner {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TokenSigner for CountingSigner {
        fn sign(&self, _claims: &AccessClaims) -> Result<String, SignerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(SignerError::Encoding("key rejected".to_string()))
            } else {
                Ok("signed".to_string())
            }
        }
    }

    fn issuer() -> CredentialIssuer {
        CredentialIssuer::new(API_KEY.to_string(), SecretString::from(API_SECRET))
    }

    #[test]
    fn test_empty_room_id_rejected_without_signing() {
        let signer = CountingSigner::new(false);
        let issuer = CredentialIssuer::with_signer(API_KEY.to_string(), signer.clone());

        let result = issuer.issue_credential("", "alice");

        assert!(matches!(result, Err(RoomError::InvalidArgument(_))));
        assert_eq!(signer.calls(), 0);
    }

    #[test]
    fn test_empty_identity_rejected_without_signing() {
        let signer = CountingSigner::new(false);
        let issuer = CredentialIssuer::with_signer(API_KEY.to_string(), signer.clone());

        let result = issuer.issue_credential("room1", "");
        assert!(matches!(result, Err(RoomError::InvalidArgument(_))));

        let result = issuer.issue_credential("room1", "   ");
        assert!(matches!(result, Err(RoomError::InvalidArgument(_))));

        assert_eq!(signer.calls(), 0);
    }

    #[test]
    fn test_signer_failure_maps_to_signing_error() {
        let signer = CountingSigner::new(true);
        let issuer = CredentialIssuer::with_signer(API_KEY.to_string(), signer.clone());

        let result = issuer.issue_credential("room1", "alice");

        assert!(matches!(result, Err(RoomError::Signing(msg)) if msg.contains("participant")));
        assert_eq!(signer.calls(), 1);
    }

    #[test]
    fn test_credential_claims() {
        let now = Utc::now();
        let token = issuer().issue_credential_at("room1", "alice", now).unwrap();

        let claims = decode_claims(&token, API_SECRET.as_bytes(), DEFAULT_CLOCK_SKEW).unwrap();

        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.iss, API_KEY);
        assert!(claims.video.is_join_scoped_to("room1"));
        assert_eq!(claims.iat, now.timestamp());
        assert_eq!(claims.nbf, now.timestamp());
        assert_eq!(claims.exp - claims.iat, 6 * 60 * 60);
    }

    #[test]
    fn test_credential_rejected_under_other_secret() {
        let token = issuer().issue_credential("room1", "alice").unwrap();

        let result = decode_claims(&token, b"some-other-secret", DEFAULT_CLOCK_SKEW);
        assert!(result.is_err());
    }

    #[test]
    fn test_credentials_have_unique_jti() {
        let issuer = issuer();
        let a = issuer.issue_credential("room1", "alice").unwrap();
        let b = issuer.issue_credential("room1", "alice").unwrap();

        let a = decode_claims(&a, API_SECRET.as_bytes(), DEFAULT_CLOCK_SKEW).unwrap();
        let b = decode_claims(&b, API_SECRET.as_bytes(), DEFAULT_CLOCK_SKEW).unwrap();
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn test_service_token_claims() {
        let token = issuer().issue_service_token(VideoGrant::list()).unwrap();

        let claims = decode_claims(&token, API_SECRET.as_bytes(), DEFAULT_CLOCK_SKEW).unwrap();

        assert_eq!(claims.sub, API_KEY);
        assert!(claims.video.room_list);
        assert!(!claims.video.room_join);
        assert_eq!(
            claims.exp - claims.iat,
            i64::try_from(SERVICE_TOKEN_TTL.as_secs()).unwrap()
        );
    }
}
