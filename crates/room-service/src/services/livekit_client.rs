//! LiveKit RoomService HTTP client.
//!
//! Calls the Twirp JSON endpoints under `/twirp/livekit.RoomService/`. Each
//! request carries a short-lived bearer token minted by the
//! [`CredentialIssuer`] with only the grant that method needs:
//!
//! | Method | Grant |
//! |---|---|
//! | `CreateRoom` | `roomCreate` |
//! | `DeleteRoom` | `roomCreate` |
//! | `ListRooms` | `roomList` |
//! | `ListParticipants` | `roomAdmin` scoped to the room |
//!
//! Responses are accepted with either snake_case or camelCase field names,
//! and 64-bit integers as JSON numbers or strings.

use crate::errors::RoomError;
use crate::observability::metrics;
use crate::services::credential_issuer::CredentialIssuer;
use crate::services::video_client::{
    RemoteParticipant, RemoteRoom, VideoServiceClient, VideoServiceError,
};
use async_trait::async_trait;
use common::jwt::VideoGrant;
use reqwest::{Client, StatusCode};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, instrument, warn};

/// Twirp service prefix.
const ROOM_SERVICE_PATH: &str = "/twirp/livekit.RoomService";

/// Connect timeout for LiveKit requests.
const LIVEKIT_CONNECT_TIMEOUT_SECS: u64 = 5;

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct CreateRoomRequest<'a> {
    name: &'a str,
    empty_timeout: u32,
    max_participants: u32,
}

#[derive(Debug, Serialize)]
struct RoomRequest<'a> {
    room: &'a str,
}

#[derive(Debug, Serialize)]
struct ListRoomsRequest {}

#[derive(Debug, Deserialize)]
struct ListRoomsResponse {
    #[serde(default)]
    rooms: Vec<WireRoom>,
}

#[derive(Debug, Deserialize)]
struct WireRoom {
    #[serde(default)]
    name: String,

    #[serde(default, alias = "creationTime", deserialize_with = "int64_field")]
    creation_time: i64,

    #[serde(default, alias = "maxParticipants")]
    max_participants: u32,

    #[serde(default, alias = "numParticipants")]
    num_participants: u32,
}

#[derive(Debug, Deserialize)]
struct ListParticipantsResponse {
    #[serde(default)]
    participants: Vec<WireParticipant>,
}

#[derive(Debug, Deserialize)]
struct WireParticipant {
    #[serde(default)]
    sid: String,

    #[serde(default)]
    identity: String,

    #[serde(default)]
    name: String,

    #[serde(default, alias = "joinedAt", deserialize_with = "int64_field")]
    joined_at: i64,
}

/// Twirp error body.
#[derive(Debug, Default, Deserialize)]
struct TwirpError {
    #[serde(default)]
    code: String,

    #[serde(default)]
    msg: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Int64Repr {
    Number(i64),
    Text(String),
}

/// protojson encodes int64 as a string; accept both.
fn int64_field<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match Int64Repr::deserialize(deserializer)? {
        Int64Repr::Number(n) => Ok(n),
        Int64Repr::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

impl From<WireRoom> for RemoteRoom {
    fn from(room: WireRoom) -> Self {
        RemoteRoom {
            name: room.name,
            creation_time: room.creation_time,
            max_participants: room.max_participants,
            num_participants: room.num_participants,
        }
    }
}

impl From<WireParticipant> for RemoteParticipant {
    fn from(p: WireParticipant) -> Self {
        RemoteParticipant {
            sid: p.sid,
            identity: p.identity,
            name: p.name,
            joined_at: p.joined_at,
        }
    }
}

// ============================================================================
// Client
// ============================================================================

/// HTTP client for the LiveKit RoomService API.
#[derive(Clone)]
pub struct LiveKitClient {
    /// HTTP client with configured timeouts.
    client: Client,

    /// API base URL (e.g. "http://localhost:7880").
    base_url: String,

    /// Mints per-request service tokens.
    issuer: Arc<CredentialIssuer>,
}

impl LiveKitClient {
    /// Create a new LiveKit client.
    ///
    /// # Errors
    ///
    /// Returns `RoomError::Internal` if the HTTP client cannot be built.
    pub fn new(
        base_url: String,
        issuer: Arc<CredentialIssuer>,
        timeout: Duration,
    ) -> Result<Self, RoomError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(LIVEKIT_CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                error!(target: "rs.services.livekit", error = %e, "Failed to build HTTP client");
                RoomError::Internal(format!("livekit client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            issuer,
        })
    }

    /// Invoke one RoomService method.
    async fn call<Req, Resp>(
        &self,
        method: &'static str,
        grant: VideoGrant,
        body: &Req,
    ) -> Result<Resp, VideoServiceError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let start = Instant::now();
        let result = self.send(method, grant, body).await;

        let status = match &result {
            Ok(_) => "success",
            Err(e) => e.error_type(),
        };
        metrics::record_livekit_request(method, status, start.elapsed());

        result
    }

    async fn send<Req, Resp>(
        &self,
        method: &'static str,
        grant: VideoGrant,
        body: &Req,
    ) -> Result<Resp, VideoServiceError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let token = self.issuer.issue_service_token(grant).map_err(|e| {
            error!(target: "rs.services.livekit", error = %e, "Failed to mint service token");
            VideoServiceError::Internal("failed to mint service token".to_string())
        })?;

        let url = format!("{}{}/{}", self.base_url, ROOM_SERVICE_PATH, method);

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                warn!(target: "rs.services.livekit", method = method, error = %e, "LiveKit request failed");
                VideoServiceError::Transport(e.to_string())
            })?;

        handle_response(method, response).await
    }
}

/// Map a LiveKit response onto the client's result type.
async fn handle_response<Resp: DeserializeOwned>(
    method: &'static str,
    response: reqwest::Response,
) -> Result<Resp, VideoServiceError> {
    let status = response.status();

    if status.is_success() {
        return response.json().await.map_err(|e| {
            error!(target: "rs.services.livekit", method = method, error = %e, "Failed to parse LiveKit response");
            VideoServiceError::Decode(e.to_string())
        });
    }

    let body = response.text().await.unwrap_or_default();
    let twirp: TwirpError = serde_json::from_str(&body).unwrap_or_default();
    let message = if twirp.msg.is_empty() {
        status.to_string()
    } else {
        twirp.msg
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            error!(target: "rs.services.livekit", method = method, status = %status, "LiveKit rejected service token");
            Err(VideoServiceError::Unauthorized(message))
        }
        StatusCode::NOT_FOUND => {
            debug!(target: "rs.services.livekit", method = method, "LiveKit returned not found");
            Err(VideoServiceError::NotFound(message))
        }
        s if s.is_server_error() => {
            warn!(target: "rs.services.livekit", method = method, status = %status, code = %twirp.code, "LiveKit returned server error");
            Err(VideoServiceError::Unavailable(message))
        }
        _ => {
            warn!(target: "rs.services.livekit", method = method, status = %status, code = %twirp.code, "Unexpected LiveKit response");
            Err(VideoServiceError::Rejected {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[async_trait]
impl VideoServiceClient for LiveKitClient {
    #[instrument(skip_all, name = "rs.livekit.create_room", fields(room_id = %room_id))]
    async fn create_room(
        &self,
        room_id: &str,
        max_participants: u32,
        empty_timeout_secs: u32,
    ) -> Result<(), VideoServiceError> {
        let request = CreateRoomRequest {
            name: room_id,
            empty_timeout: empty_timeout_secs,
            max_participants,
        };
        let _: IgnoredAny = self
            .call("CreateRoom", VideoGrant::create(), &request)
            .await?;
        Ok(())
    }

    #[instrument(skip_all, name = "rs.livekit.delete_room", fields(room_id = %room_id))]
    async fn delete_room(&self, room_id: &str) -> Result<(), VideoServiceError> {
        let _: IgnoredAny = self
            .call("DeleteRoom", VideoGrant::create(), &RoomRequest { room: room_id })
            .await?;
        Ok(())
    }

    #[instrument(skip_all, name = "rs.livekit.list_rooms")]
    async fn list_rooms(&self) -> Result<Vec<RemoteRoom>, VideoServiceError> {
        let response: ListRoomsResponse = self
            .call("ListRooms", VideoGrant::list(), &ListRoomsRequest {})
            .await?;
        Ok(response.rooms.into_iter().map(RemoteRoom::from).collect())
    }

    #[instrument(skip_all, name = "rs.livekit.list_participants", fields(room_id = %room_id))]
    async fn list_participants(
        &self,
        room_id: &str,
    ) -> Result<Vec<RemoteParticipant>, VideoServiceError> {
        let response: ListParticipantsResponse = self
            .call(
                "ListParticipants",
                VideoGrant::admin(room_id),
                &RoomRequest { room: room_id },
            )
            .await?;
        Ok(response
            .participants
            .into_iter()
            .map(RemoteParticipant::from)
            .collect())
    }
}
