//! External video service client interface.
//!
//! The registry talks to the video backend only through
//! [`VideoServiceClient`]. [`LiveKitClient`](super::livekit_client::LiveKitClient)
//! is the production implementation; [`mock::MockVideoService`] is an
//! in-memory stand-in for tests.

use async_trait::async_trait;
use thiserror::Error;

/// A room as reported by the external service's listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRoom {
    /// Room name. The registry uses its room code as the name.
    pub name: String,

    /// Creation time in Unix seconds.
    pub creation_time: i64,

    /// Capacity, 0 when the service has no limit configured.
    pub max_participants: u32,

    /// Current participant count.
    pub num_participants: u32,
}

/// A participant as reported by the external service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteParticipant {
    pub sid: String,
    pub identity: String,
    pub name: String,

    /// Join time in Unix seconds.
    pub joined_at: i64,
}

/// Errors from the external video service.
#[derive(Debug, Clone, Error)]
pub enum VideoServiceError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl VideoServiceError {
    /// Bounded label for metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            VideoServiceError::Transport(_) => "transport",
            VideoServiceError::Unauthorized(_) => "unauthorized",
            VideoServiceError::NotFound(_) => "not_found",
            VideoServiceError::Unavailable(_) => "unavailable",
            VideoServiceError::Rejected { .. } => "rejected",
            VideoServiceError::Decode(_) => "decode",
            VideoServiceError::Internal(_) => "internal",
        }
    }
}

/// Operations the registry needs from the external video service.
#[async_trait]
pub trait VideoServiceClient: Send + Sync {
    /// Provision a room.
    async fn create_room(
        &self,
        room_id: &str,
        max_participants: u32,
        empty_timeout_secs: u32,
    ) -> Result<(), VideoServiceError>;

    /// Tear a room down, disconnecting its participants.
    async fn delete_room(&self, room_id: &str) -> Result<(), VideoServiceError>;

    /// List every room known to the service.
    async fn list_rooms(&self) -> Result<Vec<RemoteRoom>, VideoServiceError>;

    /// List the participants currently in a room.
    async fn list_participants(
        &self,
        room_id: &str,
    ) -> Result<Vec<RemoteParticipant>, VideoServiceError>;
}

/// Mock video service for testing.
///
/// Keeps rooms in memory and counts every call. Each operation can be made to
/// fail, and an artificial latency can be injected to exercise cancellation.
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
    use std::sync::{Mutex, MutexGuard};
    use std::time::Duration;

    #[derive(Debug, Clone)]
    struct MockRoom {
        remote: RemoteRoom,
        empty_timeout_secs: u32,
    }

    /// In-memory video service.
    #[derive(Default)]
    pub struct MockVideoService {
        rooms: Mutex<HashMap<String, MockRoom>>,
        /// When non-empty, `list_participants` cycles through these counts
        /// instead of using the room's stored count.
        count_sequence: Mutex<Vec<u32>>,
        returned_counts: Mutex<Vec<u32>>,
        /// Yield between choosing a participant count and replying, so
        /// concurrent refreshes finish out of order.
        interleave_participant_replies: AtomicBool,
        participant_calls_in_flight: AtomicUsize,
        peak_participant_calls_in_flight: AtomicUsize,
        latency_ms: AtomicU64,
        fail_create: AtomicBool,
        fail_delete: AtomicBool,
        fail_list_rooms: AtomicBool,
        fail_list_participants: AtomicBool,
        create_calls: AtomicUsize,
        delete_calls: AtomicUsize,
        list_rooms_calls: AtomicUsize,
        list_participants_calls: AtomicUsize,
    }

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    struct InFlight<'a>(&'a AtomicUsize);

    impl<'a> InFlight<'a> {
        fn enter(counter: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
            let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            Self(counter)
        }
    }

    impl Drop for InFlight<'_> {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl MockVideoService {
        /// Empty service where every call succeeds.
        pub fn new() -> Self {
            Self::default()
        }

        /// Seed a room that exists externally.
        pub fn with_room(self, room_id: &str, max_participants: u32, participants: u32) -> Self {
            self.insert_room(room_id, max_participants, participants);
            self
        }

        /// Seed a room that exists externally.
        pub fn insert_room(&self, room_id: &str, max_participants: u32, participants: u32) {
            lock(&self.rooms).insert(
                room_id.to_string(),
                MockRoom {
                    remote: RemoteRoom {
                        name: room_id.to_string(),
                        creation_time: chrono::Utc::now().timestamp(),
                        max_participants,
                        num_participants: participants,
                    },
                    empty_timeout_secs: 0,
                },
            );
        }

        /// Set the participant count reported for a room.
        pub fn set_participants(&self, room_id: &str, participants: u32) {
            if let Some(room) = lock(&self.rooms).get_mut(room_id) {
                room.remote.num_participants = participants;
            }
        }

        /// Make `list_participants` cycle through `counts` for every room.
        pub fn set_participant_count_sequence(&self, counts: Vec<u32>) {
            *lock(&self.count_sequence) = counts;
        }

        /// Counts returned by `list_participants`, in call order.
        pub fn returned_counts(&self) -> Vec<u32> {
            lock(&self.returned_counts).clone()
        }

        /// Yield to the scheduler after a participant count is chosen and
        /// before it is returned.
        pub fn set_interleave_participant_replies(&self, interleave: bool) {
            self.interleave_participant_replies
                .store(interleave, Ordering::SeqCst);
        }

        /// Most `list_participants` calls observed running at once.
        pub fn peak_participant_calls_in_flight(&self) -> usize {
            self.peak_participant_calls_in_flight.load(Ordering::SeqCst)
        }

        /// Delay every call by `latency`.
        pub fn set_latency(&self, latency: Duration) {
            let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
            self.latency_ms.store(ms, Ordering::SeqCst);
        }

        pub fn set_fail_create(&self, fail: bool) {
            self.fail_create.store(fail, Ordering::SeqCst);
        }

        pub fn set_fail_delete(&self, fail: bool) {
            self.fail_delete.store(fail, Ordering::SeqCst);
        }

        pub fn set_fail_list_rooms(&self, fail: bool) {
            self.fail_list_rooms.store(fail, Ordering::SeqCst);
        }

        pub fn set_fail_list_participants(&self, fail: bool) {
            self.fail_list_participants.store(fail, Ordering::SeqCst);
        }

        pub fn has_room(&self, room_id: &str) -> bool {
            lock(&self.rooms).contains_key(room_id)
        }

        /// Empty-room timeout the room was provisioned with.
        pub fn empty_timeout(&self, room_id: &str) -> Option<u32> {
            lock(&self.rooms)
                .get(room_id)
                .map(|room| room.empty_timeout_secs)
        }

        /// Capacity the room was provisioned with.
        pub fn max_participants(&self, room_id: &str) -> Option<u32> {
            lock(&self.rooms)
                .get(room_id)
                .map(|room| room.remote.max_participants)
        }

        pub fn create_calls(&self) -> usize {
            self.create_calls.load(Ordering::SeqCst)
        }

        pub fn delete_calls(&self) -> usize {
            self.delete_calls.load(Ordering::SeqCst)
        }

        pub fn list_rooms_calls(&self) -> usize {
            self.list_rooms_calls.load(Ordering::SeqCst)
        }

        pub fn list_participants_calls(&self) -> usize {
            self.list_participants_calls.load(Ordering::SeqCst)
        }

        async fn simulate_latency(&self) {
            let ms = self.latency_ms.load(Ordering::SeqCst);
            if ms > 0 {
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }
        }
    }

    #[async_trait]
    impl VideoServiceClient for MockVideoService {
        async fn create_room(
            &self,
            room_id: &str,
            max_participants: u32,
            empty_timeout_secs: u32,
        ) -> Result<(), VideoServiceError> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            self.simulate_latency().await;

            if self.fail_create.load(Ordering::SeqCst) {
                return Err(VideoServiceError::Unavailable(
                    "Mock video service error".to_string(),
                ));
            }

            lock(&self.rooms).insert(
                room_id.to_string(),
                MockRoom {
                    remote: RemoteRoom {
                        name: room_id.to_string(),
                        creation_time: chrono::Utc::now().timestamp(),
                        max_participants,
                        num_participants: 0,
                    },
                    empty_timeout_secs,
                },
            );
            Ok(())
        }

        async fn delete_room(&self, room_id: &str) -> Result<(), VideoServiceError> {
            self.delete_calls.fetch_add(1, Ordering::SeqCst);
            self.simulate_latency().await;

            if self.fail_delete.load(Ordering::SeqCst) {
                return Err(VideoServiceError::Unavailable(
                    "Mock video service error".to_string(),
                ));
            }

            match lock(&self.rooms).remove(room_id) {
                Some(_) => Ok(()),
                None => Err(VideoServiceError::NotFound(format!(
                    "room {} does not exist",
                    room_id
                ))),
            }
        }

        async fn list_rooms(&self) -> Result<Vec<RemoteRoom>, VideoServiceError> {
            self.list_rooms_calls.fetch_add(1, Ordering::SeqCst);
            self.simulate_latency().await;

            if self.fail_list_rooms.load(Ordering::SeqCst) {
                return Err(VideoServiceError::Unavailable(
                    "Mock video service error".to_string(),
                ));
            }

            Ok(lock(&self.rooms)
                .values()
                .map(|room| room.remote.clone())
                .collect())
        }

        async fn list_participants(
            &self,
            room_id: &str,
        ) -> Result<Vec<RemoteParticipant>, VideoServiceError> {
            let call = self.list_participants_calls.fetch_add(1, Ordering::SeqCst);
            let _in_flight = InFlight::enter(
                &self.participant_calls_in_flight,
                &self.peak_participant_calls_in_flight,
            );
            self.simulate_latency().await;

            if self.fail_list_participants.load(Ordering::SeqCst) {
                return Err(VideoServiceError::Unavailable(
                    "Mock video service error".to_string(),
                ));
            }

            let stored = lock(&self.rooms)
                .get(room_id)
                .map(|room| room.remote.num_participants)
                .ok_or_else(|| {
                    VideoServiceError::NotFound(format!("room {} does not exist", room_id))
                })?;

            let count = {
                let sequence = lock(&self.count_sequence);
                if sequence.is_empty() {
                    stored
                } else {
                    sequence
                        .get(call % sequence.len())
                        .copied()
                        .unwrap_or(stored)
                }
            };

            lock(&self.returned_counts).push(count);

            if self.interleave_participant_replies.load(Ordering::SeqCst) {
                tokio::task::yield_now().await;
            }

            Ok((0..count)
                .map(|i| RemoteParticipant {
                    sid: format!("PA_{}_{}", room_id, i),
                    identity: format!("participant-{}", i),
                    name: format!("Participant {}", i),
                    joined_at: 0,
                })
                .collect())
        }
    }

}
