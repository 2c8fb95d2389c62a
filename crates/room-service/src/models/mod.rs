//! Room service models.
//!
//! Contains the room metadata type and the HTTP request/response bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum length of a participant display name (after trimming).
pub const MAX_PARTICIPANT_NAME_LENGTH: usize = 50;

/// Maximum length of a room display name (after trimming).
pub const MAX_ROOM_NAME_LENGTH: usize = 100;

/// Cached metadata for one room.
///
/// The external video service is authoritative for existence; this is the
/// registry's last-known view of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    /// Six-character room code (`[A-Z0-9]{6}`).
    pub id: String,

    /// Optional display label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Local provisioning time, or the external creation time for rooms
    /// discovered through the listing.
    pub created_at: DateTime<Utc>,

    /// Capacity ceiling enforced at join time.
    pub max_participants: u32,

    /// Last-known occupancy.
    pub active_participants: u32,

    /// Whether the room is live.
    pub is_active: bool,

    /// Creator identity. Not populated by the current flows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

impl Room {
    /// True when occupancy has reached capacity.
    pub fn is_full(&self) -> bool {
        self.active_participants >= self.max_participants
    }
}

/// Body of `POST /api/v1/rooms`, also the registry's create input.
///
/// Both fields are optional; an empty body creates an unnamed room with the
/// default capacity.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoomSpec {
    /// Optional display label.
    #[serde(default)]
    pub name: Option<String>,

    /// Requested capacity. Zero or absent selects the default; negative is
    /// rejected.
    #[serde(default)]
    pub max_participants: Option<i64>,
}

/// Response for a successful room creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRoomResponse {
    pub room: Room,

    /// Shareable link to the room's page.
    pub join_url: String,
}

/// Response for `GET /api/v1/rooms`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListRoomsResponse {
    pub rooms: Vec<Room>,
}

/// Body of `POST /api/v1/rooms/{id}/join`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JoinRoomRequest {
    /// Participant display name, used as the credential identity.
    #[serde(default)]
    pub name: String,
}

/// Response for a successful join.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRoomResponse {
    /// Signed access credential scoped to this room.
    pub token: String,

    /// LiveKit server URL the client connects to with `token`.
    pub livekit_url: String,

    pub room: Room,
}

/// Liveness response returned by `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always "ok" while the process is serving.
    pub status: &'static str,

    /// Service name.
    pub service: &'static str,

    pub timestamp: DateTime<Utc>,
}

/// Readiness response returned by `/ready`.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    /// "ready" or "not_ready".
    pub status: &'static str,

    /// LiveKit RoomService reachability.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub livekit: Option<&'static str>,

    /// Error message (generic, no infrastructure details).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
