//! # Digital Signatures
//!
//! Free-function wrappers over [`Keypair::sign`] and [`PublicKey::verify`],
//! so every signing path in the workspace goes through one audited place.
//!
//! Verification is a plain `bool`: callers get "valid" or "not valid" and
//! nothing that could serve as an oracle.

use super::keys::{Keypair, PublicKey, Signature};

/// Sign `message` with `keypair`.
///
/// ```
/// use diamond_hands_protocol::crypto::{sign, verify, Keypair};
///
/// let keypair = Keypair::generate();
/// let signature = sign(&keypair, b"withdraw");
/// assert!(verify(&keypair.public_key(), b"withdraw", &signature));
/// ```
pub fn sign(keypair: &Keypair, message: &[u8]) -> Signature {
    keypair.sign(message)
}

/// Verify `signature` over `message` for `public_key`.
pub fn verify(public_key: &PublicKey, message: &[u8], signature: &Signature) -> bool {
    public_key.verify(message, signature)
}
