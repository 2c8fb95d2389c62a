//! Service layer for the room service.
//!
//! - `credential_issuer` - LiveKit access token minting
//! - `video_client` - Video service client trait and its mock
//! - `livekit_client` - LiveKit RoomService implementation of the client trait

pub mod credential_issuer;
pub mod livekit_client;
pub mod video_client;

pub use credential_issuer::CredentialIssuer;
pub use livekit_client::LiveKitClient;
pub use video_client::VideoServiceClient;
