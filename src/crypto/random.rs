// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

use super::{check_length, ALPHABET};
use crate::error::Result;
use rand::rngs::OsRng;
use rand::Rng;

/// Draw a uniformly random secret over the output alphabet from the OS CSPRNG.
///
/// Only used for master values; derived keys always go through the KDF.
pub fn generate_random_secret(length: usize) -> Result<String> {
    check_length(length)?;

    let mut rng = OsRng;
    Ok((0..length)
        .map(|_| char::from(ALPHABET[rng.gen_range(0..ALPHABET.len())]))
        .collect())
}
