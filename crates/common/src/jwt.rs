//! Access token claims shared across the room service crates.
//!
//! Tokens follow the LiveKit access token format: an HS256 JWT signed with
//! the API secret, `iss` set to the API key, and a `video` claim carrying the
//! grant. Two kinds of token are minted:
//!
//! - Participant credentials: `sub` is the participant identity and the grant
//!   is `roomJoin` scoped to exactly one room. Valid for [`ACCESS_TOKEN_TTL`].
//! - Service tokens: used by the room service itself to call the LiveKit
//!   RoomService API (`roomCreate`, `roomList`, `roomAdmin`). Valid for
//!   [`SERVICE_TOKEN_TTL`].
//!
//! Verification lives here as well so the test harness and the service agree
//! on a single decoding path.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing
//! - Only HS256 is accepted
//! - The `sub` field is redacted in Debug output

use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum accepted JWT size in bytes (8KB).
///
/// Checked before any base64 decoding or signature work.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Lifetime of a participant credential (6 hours).
pub const ACCESS_TOKEN_TTL: Duration = Duration::from_secs(6 * 60 * 60);

/// Lifetime of a RoomService API token (10 minutes).
pub const SERVICE_TOKEN_TTL: Duration = Duration::from_secs(10 * 60);

/// Default clock skew tolerance applied when verifying `exp` and `nbf`.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(60);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while verifying an access token.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds [`MAX_JWT_SIZE_BYTES`].
    #[error("Access token exceeds the maximum allowed size")]
    TokenTooLarge,

    /// Token is not a well-formed JWT or the claims do not parse.
    #[error("Access token is malformed")]
    MalformedToken,

    /// Signature does not match the API secret.
    #[error("Access token signature is invalid")]
    InvalidSignature,

    /// Token is expired or not yet valid.
    #[error("Access token is expired or not yet valid")]
    Expired,
}

// =============================================================================
// Claims Types
// =============================================================================

/// Video grant carried in the `video` claim.
///
/// Field names follow the LiveKit wire format (camelCase). Unset permissions
/// are omitted from the serialized token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoGrant {
    /// Permission to create rooms.
    #[serde(default, skip_serializing_if = "is_false")]
    pub room_create: bool,

    /// Permission to list rooms.
    #[serde(default, skip_serializing_if = "is_false")]
    pub room_list: bool,

    /// Permission to join the room named in `room`.
    #[serde(default, skip_serializing_if = "is_false")]
    pub room_join: bool,

    /// Administrative permission (delete room, list participants).
    #[serde(default, skip_serializing_if = "is_false")]
    pub room_admin: bool,

    /// Room the grant is scoped to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
}

impl VideoGrant {
    /// Grant allowing a participant to join exactly one room.
    #[must_use]
    pub fn join(room: &str) -> Self {
        Self {
            room_join: true,
            room: Some(room.to_string()),
            ..Self::default()
        }
    }

    /// Grant for creating rooms.
    #[must_use]
    pub fn create() -> Self {
        Self {
            room_create: true,
            ..Self::default()
        }
    }

    /// Grant for listing rooms.
    #[must_use]
    pub fn list() -> Self {
        Self {
            room_list: true,
            ..Self::default()
        }
    }

    /// Administrative grant scoped to one room.
    #[must_use]
    pub fn admin(room: &str) -> Self {
        Self {
            room_admin: true,
            room: Some(room.to_string()),
            ..Self::default()
        }
    }

    /// Returns true if this grant allows joining `room` and nothing else.
    #[must_use]
    pub fn is_join_scoped_to(&self, room: &str) -> bool {
        self.room_join
            && !self.room_create
            && !self.room_list
            && !self.room_admin
            && self.room.as_deref() == Some(room)
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(value: &bool) -> bool {
    !*value
}

/// Access token claims.
///
/// The `sub` field holds the participant identity and is redacted in Debug
/// output.
#[derive(Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Issuer: the LiveKit API key.
    pub iss: String,

    /// Subject: participant identity (or the API key for service tokens).
    pub sub: String,

    /// Issued-at timestamp (Unix epoch seconds).
    pub iat: i64,

    /// Not-before timestamp (Unix epoch seconds).
    pub nbf: i64,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Unique token identifier.
    pub jti: String,

    /// Video grant.
    pub video: VideoGrant,
}

impl fmt::Debug for AccessClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessClaims")
            .field("iss", &self.iss)
            .field("sub", &"[REDACTED]")
            .field("iat", &self.iat)
            .field("nbf", &self.nbf)
            .field("exp", &self.exp)
            .field("jti", &self.jti)
            .field("video", &self.video)
            .finish()
    }
}

// =============================================================================
// Functions
// =============================================================================

/// Verify an access token and return its claims.
///
/// Checks the size limit first, then the HS256 signature against `secret`,
/// then `exp`/`nbf` with `clock_skew` leeway.
///
/// # Errors
///
/// Returns a [`JwtValidationError`] describing why the token was rejected.
pub fn decode_claims(
    token: &str,
    secret: &[u8],
    clock_skew: Duration,
) -> Result<AccessClaims, JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = clock_skew.as_secs();
    validation.validate_nbf = true;
    validation.validate_aud = false;
    validation.set_required_spec_claims(&["exp", "nbf", "sub", "iss"]);

    decode::<AccessClaims>(token, &DecodingKey::from_secret(secret), &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!(target: "common.jwt", error = %e, "Token rejected");
            match e.kind() {
                ErrorKind::InvalidSignature => JwtValidationError::InvalidSignature,
                ErrorKind::ExpiredSignature | ErrorKind::ImmatureSignature => {
                    JwtValidationError::Expired
                }
                _ => JwtValidationError::MalformedToken,
            }
        })
}

// =============================================================================
// Tests
// =============================================================================
