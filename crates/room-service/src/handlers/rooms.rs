//! Room handlers.
//!
//! - `POST /api/v1/rooms` - Create room
//! - `GET /api/v1/rooms` - List cached rooms
//! - `GET /api/v1/rooms/{id}` - Get room (refreshes occupancy)
//! - `POST /api/v1/rooms/{id}/join` - Join room, returns an access credential
//! - `DELETE /api/v1/rooms/{id}` - Delete room
//!
//! Every handler builds its call context from the shared shutdown token and
//! the configured request timeout.

use crate::errors::RoomError;
use crate::models::{
    CreateRoomResponse, JoinRoomRequest, JoinRoomResponse, ListRoomsResponse, Room, RoomSpec,
    MAX_PARTICIPANT_NAME_LENGTH,
};
use crate::routes::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Handler for POST /api/v1/rooms
///
/// An empty body creates an unnamed room with the default capacity.
///
/// # Response
///
/// - 201 Created: `{room, join_url}`
/// - 400 Bad Request: malformed body, negative capacity, overlong name
/// - 502 Bad Gateway: the video service refused to provision the room
/// - 503 / 504: cancelled by shutdown / request deadline exceeded
#[instrument(skip_all, name = "rs.rooms.create")]
pub async fn create_room(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<CreateRoomResponse>), RoomError> {
    let spec: RoomSpec = parse_optional_body(&body)?;

    let ctx = state.call_context();
    let room = state.registry.create_room(&ctx, spec).await?;
    let join_url = state.config.join_url(&room.id);

    info!(
        target: "rs.handlers.rooms",
        room_id = %room.id,
        max_participants = room.max_participants,
        "Room created"
    );

    Ok((StatusCode::CREATED, Json(CreateRoomResponse { room, join_url })))
}

/// Handler for GET /api/v1/rooms
///
/// Snapshot of the cache. Does not contact the video service.
#[instrument(skip_all, name = "rs.rooms.list")]
pub async fn list_rooms(State(state): State<Arc<AppState>>) -> Json<ListRoomsResponse> {
    Json(ListRoomsResponse {
        rooms: state.registry.list_rooms(),
    })
}

/// Handler for GET /api/v1/rooms/{id}
///
/// # Response
///
/// - 200 OK: room with refreshed occupancy (stale if the refresh failed)
/// - 404 Not Found: unknown locally and externally
/// - 502 Bad Gateway: external listing failed on a cache miss
#[instrument(skip_all, name = "rs.rooms.get", fields(room_id = %room_id))]
pub async fn get_room(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Result<Json<Room>, RoomError> {
    let ctx = state.call_context();
    let room = state.registry.get_room(&ctx, &room_id).await?;
    Ok(Json(room))
}

/// Handler for POST /api/v1/rooms/{id}/join
///
/// The display name doubles as the credential identity.
///
/// # Response
///
/// - 200 OK: `{token, livekit_url, room}`
/// - 400 Bad Request: missing, blank or overlong name
/// - 404 Not Found: unknown room
/// - 409 Conflict: room is at capacity
/// - 500 Internal Server Error: signing failed
#[instrument(skip_all, name = "rs.rooms.join", fields(room_id = %room_id))]
pub async fn join_room(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    body: Bytes,
) -> Result<Json<JoinRoomResponse>, RoomError> {
    let request: JoinRoomRequest = parse_optional_body(&body)?;
    let name = validate_participant_name(&request.name)?;

    let ctx = state.call_context();
    let room = state.registry.get_room(&ctx, &room_id).await?;

    if room.is_full() {
        debug!(
            target: "rs.handlers.rooms",
            room_id = %room.id,
            active = room.active_participants,
            max = room.max_participants,
            "Join rejected, room is full"
        );
        return Err(RoomError::Conflict("Room is full".to_string()));
    }

    let token = state.issuer.issue_credential(&room.id, name)?;

    info!(target: "rs.handlers.rooms", room_id = %room.id, "Participant credential issued");

    Ok(Json(JoinRoomResponse {
        token,
        livekit_url: state.config.livekit_url.clone(),
        room,
    }))
}

/// Handler for DELETE /api/v1/rooms/{id}
///
/// # Response
///
/// - 204 No Content: removed externally and locally
/// - 502 Bad Gateway: the video service failed; the room stays cached
#[instrument(skip_all, name = "rs.rooms.delete", fields(room_id = %room_id))]
pub async fn delete_room(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Result<StatusCode, RoomError> {
    let ctx = state.call_context();
    state.registry.delete_room(&ctx, &room_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Deserialize a JSON body, treating an empty body as `T::default()`.
///
/// Parsed by hand so malformed JSON is a 400 rather than axum's 422.
fn parse_optional_body<T>(body: &[u8]) -> Result<T, RoomError>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| {
        debug!(target: "rs.handlers.rooms", error = %e, "Invalid request body");
        RoomError::InvalidArgument("Invalid request body".to_string())
    })
}

/// Trim a participant name and check its length.
fn validate_participant_name(name: &str) -> Result<&str, RoomError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(RoomError::InvalidArgument("Name is required".to_string()));
    }
    if name.chars().count() > MAX_PARTICIPANT_NAME_LENGTH {
        return Err(RoomError::InvalidArgument(format!(
            "Name must be {} characters or less",
            MAX_PARTICIPANT_NAME_LENGTH
        )));
    }
    Ok(name)
}
