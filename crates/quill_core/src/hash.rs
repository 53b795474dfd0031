//! Salted digest used for record hashes and hash slot values.
//!
//! The digest is SHA-512 over the input followed by a fixed salt, truncated
//! to 20 bytes and hex-encoded. Previously written logs are validated with
//! it, so the salt and the truncation width must never change.

use sha2::{Digest, Sha512};

/// Fixed salt appended to every digest input.
///
/// Guards against trivially precomputed hashes. It is not a secret and is
/// never rotated.
const SALT: &[u8] = b"quill/append-log/v1:6f1d2c0a9b8e4f37";

/// Number of digest bytes kept.
const HASH_BYTES: usize = 20;

/// Length of a hex-encoded hash.
pub const HASH_HEX_LEN: usize = HASH_BYTES * 2;

/// Hashes a byte string.
#[must_use]
pub fn generate_hash(data: &[u8]) -> String {
    let mut hasher = Sha512::new();
    hasher.update(data);
    finish(hasher)
}

/// Hashes the UTF-8 concatenation of `parts`.
///
/// Equivalent to [`generate_hash`] over the joined bytes, without building
/// the joined string.
#[must_use]
pub fn generate_hash_parts(parts: &[&str]) -> String {
    let mut hasher = Sha512::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    finish(hasher)
}

/// Returns whether `value` has the shape of a stored hash.
#[must_use]
pub fn is_hash(value: &str) -> bool {
    value.len() == HASH_HEX_LEN
        && value
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

fn finish(mut hasher: Sha512) -> String {
    hasher.update(SALT);
    let digest = hasher.finalize();
    hex::encode(&digest[..HASH_BYTES])
}
