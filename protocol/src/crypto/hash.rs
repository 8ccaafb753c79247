//! # Hashing Utilities
//!
//! Two hash functions, each with one job:
//!
//! - **SHA-256** derives bank addresses from their seeds, the same way
//!   program-derived addresses are computed on the host chain.
//! - **BLAKE3** digests signing messages into instruction ids.

use sha2::{Digest, Sha256};

/// SHA-256 over the concatenation of `parts`.
///
/// Parts are fed to the hasher in order with no separators, so callers
/// must make sure part boundaries cannot shift (fixed-width keys, or a
/// terminal variable-length part).
pub fn sha256_parts(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// BLAKE3 digest of `data`.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_parts_matches_single_shot() {
        let whole = sha256_parts(&[b"diamond-hands"]);
        let split = sha256_parts(&[b"diamond", b"-hands"]);
        assert_eq!(whole, split);
    }

    #[test]
    fn sha256_known_vector() {
        // SHA-256("abc")
        let digest = sha256_parts(&[b"abc"]);
        assert_eq!(
            hex::encode(digest),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn blake3_is_deterministic() {
        assert_eq!(blake3_hash(b"bank"), blake3_hash(b"bank"));
        assert_ne!(blake3_hash(b"bank"), blake3_hash(b"bonk"));
    }
}
