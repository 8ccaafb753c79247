//! # Cryptographic Primitives
//!
//! Thin, type-safe wrappers around audited implementations:
//!
//! - **Ed25519** for identities and signatures.
//! - **SHA-256** for bank address derivation.
//! - **BLAKE3** for instruction digests.

pub mod hash;
pub mod keys;
pub mod signatures;

pub use hash::{blake3_hash, sha256_parts};
pub use keys::{KeyError, Keypair, PublicKey, Signature};
pub use signatures::{sign, verify};
