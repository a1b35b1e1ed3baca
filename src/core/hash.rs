//! Deterministic key derivation over SHA3-256.

use crate::core::Hash256;
use sha3::{Digest, Sha3_256};

/// Derive a key from several parts.
///
/// Each part is length-prefixed, so `("ab", "c")` and `("a", "bc")` never collide.
pub fn derive_key(parts: &[&[u8]]) -> Hash256 {
    let mut hasher = Sha3_256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part);
    }
    let result = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&result);
    Hash256::new(bytes)
}
