//! Room code generation.
//!
//! Codes are six characters drawn uniformly from `[A-Z0-9]` using the system
//! CSPRNG. Bytes at or above 252 (the largest multiple of 36 that fits in a
//! byte) are discarded so every symbol is equally likely.

use crate::errors::RoomError;
use ring::rand::{SecureRandom, SystemRandom};

/// Symbols a room code is drawn from.
pub const ROOM_CODE_ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of a room code.
pub const ROOM_CODE_LENGTH: usize = 6;

/// Random bytes below this value map uniformly onto the alphabet.
const ACCEPT_BELOW: u8 = 252;

/// Generate a fresh random room code.
///
/// # Errors
///
/// Returns `RoomError::Internal` if the system RNG fails.
pub fn generate_room_code() -> Result<String, RoomError> {
    let rng = SystemRandom::new();
    let mut code = String::with_capacity(ROOM_CODE_LENGTH);
    let mut buf = [0u8; 16];

    while code.len() < ROOM_CODE_LENGTH {
        rng.fill(&mut buf).map_err(|e| {
            tracing::error!(target: "rs.registry", error = %e, "Failed to generate random bytes for room code");
            RoomError::Internal("create_room: RNG failure".to_string())
        })?;

        for &b in buf.iter().filter(|&&b| b < ACCEPT_BELOW) {
            let idx = usize::from(b) % ROOM_CODE_ALPHABET.len();
            let ch = ROOM_CODE_ALPHABET.get(idx).ok_or_else(|| {
                RoomError::Internal("create_room: room code index out of range".to_string())
            })?;
            code.push(char::from(*ch));
            if code.len() == ROOM_CODE_LENGTH {
                break;
            }
        }
    }

    Ok(code)
}

/// True if `code` has the shape of a room code.
pub fn is_valid_room_code(code: &str) -> bool {
    code.len() == ROOM_CODE_LENGTH
        && code
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}
