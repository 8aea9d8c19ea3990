// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Argon2id based derivation of printable secrets.
//!
//! A derived secret is a pure function of the master value, the context
//! (`<namespace>/<name>/<key>`) and the requested length. The KDF output is
//! consumed as a keystream of 32-byte blocks: each character combines two
//! adjacent bytes of the current block, and every 32 characters the next
//! block is derived with salt `context || previous block`.

use super::{check_length, ALPHABET};
use crate::error::{KeysmithError, Result};
use argon2::{Algorithm, Argon2, Params, Version};
use zeroize::Zeroize;

/// Argon2id passes
pub const KDF_TIME_COST: u32 = 4;
/// Argon2id memory in KiB (64 MiB)
pub const KDF_MEMORY_KIB: u32 = 64 * 1024;
/// Argon2id lanes
pub const KDF_PARALLELISM: u32 = 1;
/// Bytes per KDF block
pub const KDF_OUTPUT_LEN: usize = 32;
/// Shortest salt Argon2 accepts, and so the shortest usable context
pub const MIN_CONTEXT_LEN: usize = 8;

/// Length used for `password` keys and as fallback
pub const PASSWORD_LENGTH: usize = 26;
/// Length used for `encryption-key` keys
pub const ENCRYPTION_KEY_LENGTH: usize = 48;

fn kdf() -> Result<Argon2<'static>> {
    let params = Params::new(
        KDF_MEMORY_KIB,
        KDF_TIME_COST,
        KDF_PARALLELISM,
        Some(KDF_OUTPUT_LEN),
    )
    .map_err(|e| KeysmithError::Derivation(format!("invalid KDF parameters: {}", e)))?;

    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

fn fill_block(kdf: &Argon2<'_>, master: &[u8], salt: &[u8], block: &mut [u8; KDF_OUTPUT_LEN]) -> Result<()> {
    kdf.hash_password_into(master, salt, block)
        .map_err(|e| KeysmithError::Derivation(e.to_string()))
}

/// Derive a printable secret of `length` characters from the master value and context.
///
/// Fails with [`KeysmithError::InvalidLength`] outside 22..=256, and with
/// [`KeysmithError::InvalidContext`] for contexts the KDF cannot take as salt.
pub fn derive_secret(master: &str, context: &str, length: usize) -> Result<String> {
    check_length(length)?;
    if context.len() < MIN_CONTEXT_LEN {
        return Err(KeysmithError::InvalidContext(context.to_string()));
    }

    let kdf = kdf()?;
    let master = master.as_bytes();
    let context = context.as_bytes();

    let mut block = [0u8; KDF_OUTPUT_LEN];
    fill_block(&kdf, master, context, &mut block)?;

    let mut salt = Vec::with_capacity(context.len() + KDF_OUTPUT_LEN);
    let mut result = String::with_capacity(length);

    for i in 0..length {
        let offset = i % KDF_OUTPUT_LEN;

        if i > 0 && offset == 0 {
            salt.clear();
            salt.extend_from_slice(context);
            salt.extend_from_slice(&block);
            fill_block(&kdf, master, &salt, &mut block)?;
        }

        let index = (usize::from(block[offset])
            + usize::from(block[(offset + 1) % KDF_OUTPUT_LEN]))
            % ALPHABET.len();
        result.push(char::from(ALPHABET[index]));
    }

    block.zeroize();
    salt.zeroize();

    Ok(result)
}

/// Length of a derived key by its declared type.
///
/// A custom length of zero counts as unset.
pub fn secret_length(secret_type: &str, custom_length: Option<usize>) -> usize {
    match secret_type {
        "password" => PASSWORD_LENGTH,
        "encryption-key" => ENCRYPTION_KEY_LENGTH,
        "custom" => custom_length
            .filter(|length| *length > 0)
            .unwrap_or(PASSWORD_LENGTH),
        _ => PASSWORD_LENGTH,
    }
}

/// Derivation context isolating a key per namespace, declaration and key name
pub fn build_context(namespace: &str, name: &str, key: &str) -> String {
    format!("{}/{}/{}", namespace, name, key)
}

/// Three-digit fingerprint of a derived value: the byte sum modulo 1000.
pub fn key_hash(value: &[u8]) -> u16 {
    let sum: u32 = value.iter().map(|b| u32::from(*b)).sum();
    (sum % 1000) as u16
}
