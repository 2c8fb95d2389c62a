//! Common utilities and types shared across the room service crates.

#![warn(clippy::pedantic)]

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for access token claims, lifetimes and verification
pub mod jwt;
