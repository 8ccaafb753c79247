//! # Bank Records
//!
//! A [`BankRecord`] is the persisted state of one two-party timelocked
//! transfer: who deposited, who may receive, how much, and the moment
//! before which nothing moves. Records are write-once. Release is
//! modelled by deleting the record, not by flipping a flag, so a
//! released bank cannot be addressed again.
//!
//! Records live at a [`BankAddress`]. The canonical address is derived
//! from the agreement itself:
//!
//! ```text
//! address = SHA-256("diamond-hands/bank" || sender || receiver || decimal(timestamp))
//! ```
//!
//! Any 32 bytes are a valid address, which lets a caller pick one
//! explicitly (including reusing an identity key) when the engine's
//! address policy allows it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::{BANK_ADDRESS_LENGTH, BANK_ADDRESS_SEED};
use crate::crypto::hash::sha256_parts;
use crate::crypto::keys::{KeyError, PublicKey};

/// Address of a bank record and of its custody slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BankAddress([u8; BANK_ADDRESS_LENGTH]);

impl BankAddress {
    pub fn as_bytes(&self) -> &[u8; BANK_ADDRESS_LENGTH] {
        &self.0
    }

    /// Derive the canonical address for an agreement.
    ///
    /// The timestamp is hashed as its decimal string. Keys are fixed width
    /// and the timestamp is the last part, so seed boundaries cannot shift.
    pub fn derive(sender: &PublicKey, receiver: &PublicKey, timestamp: i64) -> Self {
        let timestamp = timestamp.to_string();
        Self(sha256_parts(&[
            BANK_ADDRESS_SEED,
            sender.as_bytes(),
            receiver.as_bytes(),
            timestamp.as_bytes(),
        ]))
    }

    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }
}

impl From<PublicKey> for BankAddress {
    fn from(key: PublicKey) -> Self {
        Self(*key.as_bytes())
    }
}

impl FromStr for BankAddress {
    type Err = KeyError;

    /// Same encodings as [`PublicKey`]: base58 or 64 hex characters.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: PublicKey = s.parse()?;
        Ok(key.into())
    }
}

impl fmt::Display for BankAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base58())
    }
}

impl fmt::Debug for BankAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BankAddress({})", self.to_base58())
    }
}

/// One custodial agreement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankRecord {
    /// Depositor. The only identity allowed to trigger release.
    pub sender: PublicKey,
    /// Beneficiary. The only identity released funds may go to.
    pub receiver: PublicKey,
    /// Amount held in custody. Always the amount moved at release.
    pub amount: u64,
    /// Unix-seconds deadline. Release is refused while `now < timestamp`.
    pub timestamp: i64,
}

impl BankRecord {
    pub fn new(sender: PublicKey, receiver: PublicKey, amount: u64, timestamp: i64) -> Self {
        Self {
            sender,
            receiver,
            amount,
            timestamp,
        }
    }

    /// Whether the timelock has expired at `now`. The deadline itself counts
    /// as expired.
    pub fn is_unlocked(&self, now: i64) -> bool {
        now >= self.timestamp
    }

    /// The canonical address of this record.
    pub fn derived_address(&self) -> BankAddress {
        BankAddress::derive(&self.sender, &self.receiver, self.timestamp)
    }
}
