//! Room registry.
//!
//! Owns the local `id → Room` cache and reconciles it against the external
//! video service, which is authoritative for whether a room exists.
//!
//! # Concurrency
//!
//! A single reader/writer lock guards the map and the set of ids reserved by
//! in-flight creates. Mutations take the write lock, snapshot reads take the
//! read lock, and the lock is never held across a call into the video
//! service. Concurrent refreshes of one room race; the last writer wins.
//!
//! # Reconciliation
//!
//! - Create provisions externally first and caches only on success.
//! - Get serves from the cache and refreshes occupancy; on a miss it falls
//!   back to the external listing and caches what it finds.
//! - Delete removes externally first and evicts only on success.
//!
//! Occupancy refresh failures do not fail the read. They are published as
//! [`RefreshFailure`] events, logged, and counted.

pub mod room_code;

use crate::context::CallContext;
use crate::errors::RoomError;
use crate::models::{Room, RoomSpec, MAX_ROOM_NAME_LENGTH};
use crate::observability::metrics;
use crate::services::video_client::{RemoteRoom, VideoServiceClient, VideoServiceError};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

/// Empty-room timeout requested from the video service, in seconds.
pub const EMPTY_TIMEOUT_SECS: u32 = 300;

/// Attempts at finding an unused room code before giving up.
pub const MAX_CODE_GENERATION_ATTEMPTS: usize = 8;

/// Buffered refresh-failure events per subscriber.
const REFRESH_FAILURE_CHANNEL_CAPACITY: usize = 64;

/// Room code source. Injectable so collision handling can be exercised.
pub type CodeGenerator = Box<dyn Fn() -> Result<String, RoomError> + Send + Sync>;

/// An occupancy refresh that failed and was served stale.
#[derive(Debug, Clone)]
pub struct RefreshFailure {
    pub room_id: String,
    pub error: VideoServiceError,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct RegistryState {
    rooms: HashMap<String, Room>,
    /// Ids handed to in-flight creates that have not been cached yet.
    reserved: HashSet<String>,
}

/// Lock-protected cache of rooms reconciled against the video service.
pub struct RoomRegistry {
    client: Arc<dyn VideoServiceClient>,
    state: RwLock<RegistryState>,
    default_max_participants: u32,
    refresh_failures: broadcast::Sender<RefreshFailure>,
    generate_code: CodeGenerator,
}

/// An id reserved for one create. Released on drop unless committed.
struct Reservation<'a> {
    registry: &'a RoomRegistry,
    id: String,
    committed: bool,
}

impl Reservation<'_> {
    fn commit(mut self, room: Room) -> Room {
        let mut state = self.registry.write();
        state.reserved.remove(&self.id);
        state.rooms.insert(self.id.clone(), room.clone());
        metrics::set_cached_rooms(state.rooms.len());
        self.committed = true;
        room
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.registry.write().reserved.remove(&self.id);
        }
    }
}

impl RoomRegistry {
    /// Registry using CSPRNG room codes.
    pub fn new(client: Arc<dyn VideoServiceClient>, default_max_participants: u32) -> Self {
        Self::with_code_generator(
            client,
            default_max_participants,
            Box::new(room_code::generate_room_code),
        )
    }

    /// Registry with a custom room code source.
    pub fn with_code_generator(
        client: Arc<dyn VideoServiceClient>,
        default_max_participants: u32,
        generate_code: CodeGenerator,
    ) -> Self {
        let (refresh_failures, _) = broadcast::channel(REFRESH_FAILURE_CHANNEL_CAPACITY);
        Self {
            client,
            state: RwLock::new(RegistryState::default()),
            default_max_participants,
            refresh_failures,
            generate_code,
        }
    }

    /// Subscribe to occupancy refresh failures.
    pub fn subscribe_refresh_failures(&self) -> broadcast::Receiver<RefreshFailure> {
        self.refresh_failures.subscribe()
    }

    /// Provision a room externally and cache it.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for a negative or oversized capacity or an overlong name
    /// - `Provisioning` if the video service refuses; nothing is cached
    /// - `Internal` if no unused room code could be found
    /// - `Cancelled` / `DeadlineExceeded` from `ctx`; nothing is cached
    #[instrument(skip_all, name = "rs.registry.create_room")]
    pub async fn create_room(&self, ctx: &CallContext, spec: RoomSpec) -> Result<Room, RoomError> {
        let start = Instant::now();
        let result = self.create_room_inner(ctx, spec).await;
        record_outcome("create_room", &result, start);
        result
    }

    async fn create_room_inner(
        &self,
        ctx: &CallContext,
        spec: RoomSpec,
    ) -> Result<Room, RoomError> {
        let name = normalize_room_name(spec.name)?;
        let max_participants = self.resolve_capacity(spec.max_participants)?;
        ctx.check("create_room")?;

        let reservation = self.reserve_id()?;
        let id = reservation.id.clone();

        match ctx
            .run(
                "create_room",
                self.client
                    .create_room(&id, max_participants, EMPTY_TIMEOUT_SECS),
            )
            .await?
        {
            Ok(()) => {}
            Err(e) => {
                warn!(target: "rs.registry", room_id = %id, error = %e, "Video service refused room creation");
                return Err(RoomError::Provisioning(format!("create_room {}: {}", id, e)));
            }
        }

        let room = reservation.commit(Room {
            id,
            name,
            created_at: Utc::now(),
            max_participants,
            active_participants: 0,
            is_active: true,
            created_by: None,
        });

        info!(
            target: "rs.registry",
            room_id = %room.id,
            max_participants = room.max_participants,
            "Room created"
        );

        Ok(room)
    }

    /// Look up a room, refreshing its occupancy.
    ///
    /// A cache hit never touches the external listing. A miss lists external
    /// rooms and caches a match.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for an empty id
    /// - `NotFound` if the room exists neither locally nor externally
    /// - `Lookup` if the external listing fails on a cache miss
    /// - `Cancelled` / `DeadlineExceeded` from `ctx`; the cache is untouched
    #[instrument(skip_all, name = "rs.registry.get_room")]
    pub async fn get_room(&self, ctx: &CallContext, room_id: &str) -> Result<Room, RoomError> {
        let start = Instant::now();
        let result = self.get_room_inner(ctx, room_id).await;
        record_outcome("get_room", &result, start);
        result
    }

    async fn get_room_inner(&self, ctx: &CallContext, room_id: &str) -> Result<Room, RoomError> {
        let id = normalize_room_id(room_id)?;
        ctx.check("get_room")?;

        match self.cached_room(&id) {
            Some(room) => {
                metrics::record_cache_lookup(true);
                debug!(target: "rs.registry", room_id = %id, "Room cache hit");
                if room.is_active {
                    self.refresh_occupancy(ctx, room).await
                } else {
                    Ok(room)
                }
            }
            None => {
                metrics::record_cache_lookup(false);
                debug!(target: "rs.registry", room_id = %id, "Room cache miss, listing external rooms");
                self.materialize(ctx, &id).await
            }
        }
    }

    /// Query the participant count and overwrite `active_participants`.
    ///
    /// Service failures are reported and the stale room is returned. Context
    /// termination propagates.
    async fn refresh_occupancy(&self, ctx: &CallContext, room: Room) -> Result<Room, RoomError> {
        let participants = match ctx
            .run("get_room", self.client.list_participants(&room.id))
            .await?
        {
            Ok(participants) => participants,
            Err(e) => {
                self.report_refresh_failure(&room.id, e);
                return Ok(room);
            }
        };

        let count = u32::try_from(participants.len()).unwrap_or(u32::MAX);
        Ok(self.apply_occupancy(room, count))
    }

    fn apply_occupancy(&self, mut snapshot: Room, count: u32) -> Room {
        let mut state = self.write();
        match state.rooms.get_mut(&snapshot.id) {
            Some(entry) => {
                entry.active_participants = count;
                entry.clone()
            }
            None => {
                // Deleted while the refresh was in flight; do not resurrect it
                snapshot.active_participants = count;
                snapshot
            }
        }
    }

    fn report_refresh_failure(&self, room_id: &str, error: VideoServiceError) {
        warn!(
            target: "rs.registry",
            room_id = %room_id,
            error = %error,
            "Occupancy refresh failed, serving cached value"
        );
        metrics::record_refresh_failure(error.error_type());

        // No subscribers is fine
        let _ = self.refresh_failures.send(RefreshFailure {
            room_id: room_id.to_string(),
            error,
            occurred_at: Utc::now(),
        });
    }

    /// Find `id` in the external listing and cache it.
    async fn materialize(&self, ctx: &CallContext, id: &str) -> Result<Room, RoomError> {
        let remote_rooms = match ctx.run("get_room", self.client.list_rooms()).await? {
            Ok(rooms) => rooms,
            Err(e) => {
                warn!(target: "rs.registry", room_id = %id, error = %e, "External room listing failed");
                return Err(RoomError::Lookup(format!(
                    "get_room {}: list_rooms: {}",
                    id, e
                )));
            }
        };

        let remote = remote_rooms
            .into_iter()
            .find(|r| r.name == id)
            .ok_or_else(|| RoomError::NotFound("Room not found".to_string()))?;

        let room = self.cache_remote(remote);

        info!(target: "rs.registry", room_id = %room.id, "Room discovered from external listing");

        Ok(room)
    }

    fn cache_remote(&self, remote: RemoteRoom) -> Room {
        // creation_time is omitted (0) when the service did not report it
        let created_at = Some(remote.creation_time)
            .filter(|secs| *secs > 0)
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .unwrap_or_else(Utc::now);
        let max_participants = if remote.max_participants == 0 {
            self.default_max_participants
        } else {
            remote.max_participants
        };

        let candidate = Room {
            id: remote.name.clone(),
            name: None,
            created_at,
            max_participants,
            active_participants: remote.num_participants,
            is_active: true,
            created_by: None,
        };

        let mut state = self.write();
        // A concurrent create or materialize may have won the race; keep it
        let room = state
            .rooms
            .entry(remote.name)
            .or_insert(candidate)
            .clone();
        metrics::set_cached_rooms(state.rooms.len());
        room
    }

    /// Delete a room externally, then evict it locally.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for an empty id
    /// - `Deletion` if the video service fails; the cache entry is untouched
    /// - `Cancelled` / `DeadlineExceeded` from `ctx`; the cache entry is untouched
    #[instrument(skip_all, name = "rs.registry.delete_room")]
    pub async fn delete_room(&self, ctx: &CallContext, room_id: &str) -> Result<(), RoomError> {
        let start = Instant::now();
        let result = self.delete_room_inner(ctx, room_id).await;
        record_outcome("delete_room", &result, start);
        result
    }

    async fn delete_room_inner(&self, ctx: &CallContext, room_id: &str) -> Result<(), RoomError> {
        let id = normalize_room_id(room_id)?;
        ctx.check("delete_room")?;

        if let Err(e) = ctx
            .run("delete_room", self.client.delete_room(&id))
            .await?
        {
            warn!(target: "rs.registry", room_id = %id, error = %e, "Video service refused room deletion");
            return Err(RoomError::Deletion(format!("delete_room {}: {}", id, e)));
        }

        self.evict(&id);

        info!(target: "rs.registry", room_id = %id, "Room deleted");

        Ok(())
    }

    fn evict(&self, id: &str) {
        let mut state = self.write();
        state.rooms.remove(id);
        metrics::set_cached_rooms(state.rooms.len());
    }

    /// Snapshot of every cached room, oldest first.
    pub fn list_rooms(&self) -> Vec<Room> {
        let mut rooms: Vec<Room> = self.read().rooms.values().cloned().collect();
        rooms.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        rooms
    }

    /// Cached entry for `id` without contacting the video service.
    pub fn cached_room(&self, id: &str) -> Option<Room> {
        self.read().rooms.get(id).cloned()
    }

    /// Number of cached rooms.
    pub fn len(&self) -> usize {
        self.read().rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of ids held by in-flight creates.
    pub fn reserved_count(&self) -> usize {
        self.read().reserved.len()
    }

    fn resolve_capacity(&self, requested: Option<i64>) -> Result<u32, RoomError> {
        match requested {
            None | Some(0) => Ok(self.default_max_participants),
            Some(n) if n < 0 => Err(RoomError::InvalidArgument(
                "max_participants must not be negative".to_string(),
            )),
            Some(n) => u32::try_from(n).map_err(|_| {
                RoomError::InvalidArgument(format!(
                    "max_participants must not exceed {}",
                    u32::MAX
                ))
            }),
        }
    }

    /// Pick an id that is neither cached nor reserved, and reserve it.
    fn reserve_id(&self) -> Result<Reservation<'_>, RoomError> {
        let mut state = self.write();

        for attempt in 1..=MAX_CODE_GENERATION_ATTEMPTS {
            let code = (self.generate_code)()?;
            if !state.rooms.contains_key(&code) && !state.reserved.contains(&code) {
                state.reserved.insert(code.clone());
                return Ok(Reservation {
                    registry: self,
                    id: code,
                    committed: false,
                });
            }
            debug!(target: "rs.registry", attempt = attempt, "Room code collision, retrying");
        }

        error!(
            target: "rs.registry",
            attempts = MAX_CODE_GENERATION_ATTEMPTS,
            "Failed to generate a unique room code"
        );
        Err(RoomError::Internal(format!(
            "create_room: no unused room code after {} attempts",
            MAX_CODE_GENERATION_ATTEMPTS
        )))
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn record_outcome<T>(operation: &str, result: &Result<T, RoomError>, start: Instant) {
    match result {
        Ok(_) => metrics::record_registry_operation(operation, "success", None, start.elapsed()),
        Err(e) => metrics::record_registry_operation(
            operation,
            "error",
            Some(e.error_type()),
            start.elapsed(),
        ),
    }
}

/// Trim a room id; reject empty input.
fn normalize_room_id(room_id: &str) -> Result<String, RoomError> {
    let id = room_id.trim();
    if id.is_empty() {
        return Err(RoomError::InvalidArgument("Room ID is required".to_string()));
    }
    Ok(id.to_string())
}

fn normalize_room_name(name: Option<String>) -> Result<Option<String>, RoomError> {
    let Some(name) = name else {
        return Ok(None);
    };
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > MAX_ROOM_NAME_LENGTH {
        return Err(RoomError::InvalidArgument(format!(
            "Room name must be {} characters or less",
            MAX_ROOM_NAME_LENGTH
        )));
    }
    Ok(Some(trimmed.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::services::video_client::mock::MockVideoService;
    use std::sync::Mutex;

    fn registry_with(mock: Arc<MockVideoService>) -> RoomRegistry {
        RoomRegistry::new(mock, 20)
    }

    /// Generator that yields `codes` in order, then repeats the last one.
    fn scripted_codes(codes: &[&str]) -> CodeGenerator {
        let codes: Vec<String> = codes.iter().map(|c| c.to_string()).collect();
        let next = Mutex::new(0usize);
        Box::new(move || {
            let mut i = next.lock().unwrap();
            let code = codes
                .get(*i)
                .or_else(|| codes.last())
                .cloned()
                .unwrap();
            *i += 1;
            Ok(code)
        })
    }

    #[test]
    fn test_resolve_capacity() {
        let registry = registry_with(Arc::new(MockVideoService::new()));

        assert_eq!(registry.resolve_capacity(None).unwrap(), 20);
        assert_eq!(registry.resolve_capacity(Some(0)).unwrap(), 20);
        assert_eq!(registry.resolve_capacity(Some(7)).unwrap(), 7);
        assert!(matches!(
            registry.resolve_capacity(Some(-1)),
            Err(RoomError::InvalidArgument(_))
        ));
        assert!(matches!(
            registry.resolve_capacity(Some(i64::from(u32::MAX) + 1)),
            Err(RoomError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_normalize_room_name() {
        assert_eq!(normalize_room_name(None).unwrap(), None);
        assert_eq!(normalize_room_name(Some("  ".to_string())).unwrap(), None);
        assert_eq!(
            normalize_room_name(Some(" Standup ".to_string())).unwrap(),
            Some("Standup".to_string())
        );
        assert!(normalize_room_name(Some("x".repeat(MAX_ROOM_NAME_LENGTH + 1))).is_err());
    }

    #[test]
    fn test_normalize_room_id() {
        assert_eq!(normalize_room_id(" ABC123 ").unwrap(), "ABC123");
        assert_eq!(normalize_room_id("lobby").unwrap(), "lobby");
        assert!(matches!(
            normalize_room_id("  "),
            Err(RoomError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_collision_retries_past_cached_id() {
        let mock = Arc::new(MockVideoService::new());
        let registry = RoomRegistry::with_code_generator(
            mock.clone(),
            20,
            scripted_codes(&["AAAAAA", "AAAAAA", "BBBBBB"]),
        );
        let ctx = CallContext::background();

        let first = registry.create_room(&ctx, RoomSpec::default()).await.unwrap();
        let second = registry.create_room(&ctx, RoomSpec::default()).await.unwrap();

        assert_eq!(first.id, "AAAAAA");
        assert_eq!(second.id, "BBBBBB");
        assert_eq!(mock.create_calls(), 2);
    }

    #[tokio::test]
    async fn test_collision_exhaustion_is_internal_error() {
        let mock = Arc::new(MockVideoService::new());
        let registry =
            RoomRegistry::with_code_generator(mock.clone(), 20, scripted_codes(&["AAAAAA"]));
        let ctx = CallContext::background();

        registry.create_room(&ctx, RoomSpec::default()).await.unwrap();
        let result = registry.create_room(&ctx, RoomSpec::default()).await;

        assert!(matches!(result, Err(RoomError::Internal(_))));
        // The exhausted create never reached the video service
        assert_eq!(mock.create_calls(), 1);
        assert_eq!(registry.reserved_count(), 0);
    }

    #[tokio::test]
    async fn test_reservation_released_on_provisioning_failure() {
        let mock = Arc::new(MockVideoService::new());
        mock.set_fail_create(true);
        let registry = registry_with(mock);

        let result = registry
            .create_room(&CallContext::background(), RoomSpec::default())
            .await;

        assert!(matches!(result, Err(RoomError::Provisioning(_))));
        assert_eq!(registry.reserved_count(), 0);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_failure_is_published() {
        let mock = Arc::new(MockVideoService::new());
        let registry = registry_with(mock.clone());
        let mut failures = registry.subscribe_refresh_failures();
        let ctx = CallContext::background();

        let room = registry.create_room(&ctx, RoomSpec::default()).await.unwrap();
        mock.set_fail_list_participants(true);

        let fetched = registry.get_room(&ctx, &room.id).await.unwrap();
        assert_eq!(fetched, room);

        let event = failures.try_recv().unwrap();
        assert_eq!(event.room_id, room.id);
        assert!(matches!(event.error, VideoServiceError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_inactive_room_is_not_refreshed() {
        let mock = Arc::new(MockVideoService::new());
        let registry = registry_with(mock.clone());
        let ctx = CallContext::background();

        let room = registry.create_room(&ctx, RoomSpec::default()).await.unwrap();
        registry
            .write()
            .rooms
            .get_mut(&room.id)
            .unwrap()
            .is_active = false;

        registry.get_room(&ctx, &room.id).await.unwrap();
        assert_eq!(mock.list_participants_calls(), 0);
    }

    #[tokio::test]
    async fn test_refresh_does_not_resurrect_deleted_room() {
        let mock = Arc::new(MockVideoService::new());
        let registry = registry_with(mock);
        let ctx = CallContext::background();

        let room = registry.create_room(&ctx, RoomSpec::default()).await.unwrap();
        registry.evict(&room.id);

        let returned = registry.apply_occupancy(room.clone(), 3);
        assert_eq!(returned.active_participants, 3);
        assert!(registry.cached_room(&room.id).is_none());
    }

    #[tokio::test]
    async fn test_materialized_room_with_zero_capacity_gets_default() {
        let mock = Arc::new(MockVideoService::new().with_room("REMOTE", 0, 2));
        let registry = registry_with(mock);

        let room = registry
            .get_room(&CallContext::background(), "REMOTE")
            .await
            .unwrap();

        assert_eq!(room.max_participants, 20);
        assert_eq!(room.active_participants, 2);
        assert!(room.is_active);
        assert!(room.name.is_none());
    }
}
