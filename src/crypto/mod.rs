// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Deterministic secret derivation and random master value generation.

pub mod derivation;
pub mod random;

pub use derivation::{build_context, derive_secret, key_hash, secret_length};
pub use random::generate_random_secret;

/// Output alphabet shared by derived and random secrets (digits, upper, lower)
pub const ALPHABET: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Shortest secret the engine will produce
pub const MIN_LENGTH: usize = 22;

/// Longest secret the engine will produce
pub const MAX_LENGTH: usize = 256;

pub(crate) fn check_length(length: usize) -> crate::error::Result<()> {
    if (MIN_LENGTH..=MAX_LENGTH).contains(&length) {
        Ok(())
    } else {
        Err(crate::error::KeysmithError::InvalidLength(length))
    }
}
