//! # Protocol Configuration & Constants
//!
//! Every fixed number the custody engine and its ledgers agree on lives
//! here. Changing the address seed or the tree names after records exist
//! on disk orphans those records, so treat this file as a schema.

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Protocol version string reported by the CLI.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Version byte prefixed to every signing message. Bump when the
/// instruction encoding changes so old signatures stop verifying.
pub const INSTRUCTION_ENCODING_VERSION: u8 = 1;

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// Signature scheme used for every identity.
pub const SIGNING_ALGORITHM: &str = "Ed25519";

/// Signing key length in bytes.
pub const SIGNING_KEY_LENGTH: usize = 32;

/// Public key (identity) length in bytes.
pub const VERIFYING_KEY_LENGTH: usize = 32;

/// Ed25519 signature length in bytes.
pub const SIGNATURE_LENGTH: usize = 64;

/// Bank address length in bytes. Same width as an identity so the two can
/// share encodings, and so a caller may reuse a key as an address.
pub const BANK_ADDRESS_LENGTH: usize = 32;

/// Domain separator hashed in front of the derivation seeds of a bank
/// address. Keeps derived addresses out of the identity keyspace.
pub const BANK_ADDRESS_SEED: &[u8] = b"diamond-hands/bank";

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// sled tree holding spendable balances, keyed by identity bytes.
pub const TREE_BALANCES: &str = "balances";

/// sled tree holding custody slot balances, keyed by bank address bytes.
pub const TREE_CUSTODY: &str = "custody";

/// sled tree holding bincode-encoded bank records, keyed by bank address bytes.
pub const TREE_BANKS: &str = "banks";

/// sled tree of retired bank addresses. Presence of a key is the tombstone.
pub const TREE_RETIRED: &str = "retired";

/// Default data directory for the CLI ledger.
pub const DEFAULT_DATA_DIR: &str = ".diamond-hands";

/// Sub-directory of the data directory that holds the sled database.
pub const LEDGER_DIR_NAME: &str = "ledger";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_names_are_distinct() {
        assert_ne!(TREE_BALANCES, TREE_CUSTODY);
        assert_ne!(TREE_BALANCES, TREE_BANKS);
        assert_ne!(TREE_CUSTODY, TREE_BANKS);
        for name in [TREE_BALANCES, TREE_CUSTODY, TREE_BANKS] {
            assert_ne!(name, TREE_RETIRED);
        }
    }

    #[test]
    fn address_width_matches_identity_width() {
        assert_eq!(BANK_ADDRESS_LENGTH, VERIFYING_KEY_LENGTH);
    }

    #[test]
    fn crypto_parameter_sizes() {
        assert_eq!(SIGNING_KEY_LENGTH, 32);
        assert_eq!(VERIFYING_KEY_LENGTH, 32);
        assert_eq!(SIGNATURE_LENGTH, 64);
    }
}
