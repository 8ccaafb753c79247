//! # Diamond Hands Custody Contract
//!
//! A sender locks funds for a receiver until a deadline. The lifecycle is:
//!
//! 1. **CreateBank**: sender and receiver co-sign; the amount leaves the
//!    sender's balance and sits in the bank's custody slot, owned by nobody.
//! 2. **WithdrawBank**: once the deadline has passed, the *sender* releases
//!    the full recorded amount to the recorded receiver. The record is
//!    deleted in the same commit, so the bank can never pay out twice.
//!
//! There is no cancel or refund path. A bank leaves custody one way only.
//!
//! ```text
//!   Created ──[caller = sender ∧ now ≥ timestamp]──▶ Released (record gone)
//!      │
//!      └──[anything else]──▶ Created (rejected, no state change)
//! ```
//!
//! ## Validation order
//!
//! Every check runs against ledger reads before a single write is issued.
//! Withdrawal checks identity before the timelock, so a non-sender always
//! sees [`CustodyError::HandsTooWeak`] whether or not the deadline passed.
//! A premature withdrawal by the sender, and a withdrawal naming the wrong
//! receiver, both surface as [`CustodyError::WrongAccount`]; the attached
//! [`WrongAccountReason`] tells them apart.
//!
//! The comparison time of a withdrawal is an explicit argument. The engine
//! never reads a clock.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

use diamond_hands_protocol::crypto::keys::PublicKey;
use diamond_hands_protocol::storage::{
    BankAddress, BankRecord, Ledger, LedgerBatch, LedgerError,
};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Which structural mismatch produced a [`CustodyError::WrongAccount`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WrongAccountReason {
    /// The bank address is not the one derived from the agreement.
    AddressMismatch { expected: BankAddress },
    /// The receiver account is not the record's receiver.
    ReceiverMismatch { expected: PublicKey },
    /// The timelock has not expired at the supplied time.
    TimelockActive { now: i64, unlocks_at: i64 },
}

impl fmt::Display for WrongAccountReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WrongAccountReason::AddressMismatch { expected } => {
                write!(f, "bank address does not match derived address {expected}")
            }
            WrongAccountReason::ReceiverMismatch { expected } => {
                write!(f, "receiver does not match recorded receiver {expected}")
            }
            WrongAccountReason::TimelockActive { now, unlocks_at } => {
                write!(f, "timelock active until {unlocks_at} (now {now})")
            }
        }
    }
}

/// The party an account slot stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignerRole {
    Sender,
    Receiver,
}

impl fmt::Display for SignerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignerRole::Sender => write!(f, "sender"),
            SignerRole::Receiver => write!(f, "receiver"),
        }
    }
}

/// Errors surfaced by the custody engine and runtime.
#[derive(Debug, Error)]
pub enum CustodyError {
    /// A bank must hold a positive amount.
    #[error("invalid amount: a bank must hold more than zero")]
    InvalidAmount,

    /// The sender cannot cover the deposit.
    #[error("insufficient funds: have {available}, need {required}")]
    InsufficientFunds { available: u64, required: u64 },

    /// The target address holds an active record, or held one that was
    /// released. Addresses are single use.
    #[error("bank {0} already exists")]
    RecordAlreadyExists(BankAddress),

    /// No active record at the address (never created, or already released).
    #[error("bank {0} not found")]
    RecordNotFound(BankAddress),

    /// An account does not line up with the agreement, or the deadline has
    /// not passed yet.
    #[error("wrong account: {reason}")]
    WrongAccount { reason: WrongAccountReason },

    /// The caller is not entitled to release this bank.
    #[error("hands too weak: only the depositor may release this bank")]
    HandsTooWeak,

    /// A party whose signature the instruction requires did not sign.
    #[error("missing signature from {role}")]
    MissingSigner { role: SignerRole },

    /// A signature attached to the instruction did not verify.
    #[error("invalid signature from {signer}")]
    InvalidSignature { signer: PublicKey },

    /// The instruction could not be encoded for signing.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// The ledger failed for a reason unrelated to the agreement.
    #[error("ledger error: {0}")]
    Ledger(LedgerError),
}

impl From<LedgerError> for CustodyError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientFunds {
                available,
                required,
                ..
            } => CustodyError::InsufficientFunds {
                available,
                required,
            },
            LedgerError::RecordAlreadyExists(bank) => CustodyError::RecordAlreadyExists(bank),
            LedgerError::RecordNotFound(bank) => CustodyError::RecordNotFound(bank),
            other => CustodyError::Ledger(other),
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// How a new bank's address is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AddressPolicy {
    /// The address must be [`BankAddress::derive`] of the agreement. One
    /// sender can hold many banks, one per (receiver, deadline).
    #[default]
    Derived,
    /// Any unoccupied address is accepted, including an identity key.
    CallerChosen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub address_policy: AddressPolicy,
}

// ---------------------------------------------------------------------------
// Accounts & signers
// ---------------------------------------------------------------------------

/// The accounts an instruction operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankAccounts {
    pub bank: BankAddress,
    pub sender: PublicKey,
    pub receiver: PublicKey,
}

impl BankAccounts {
    /// Accounts for a bank at its derived address.
    pub fn derived(sender: PublicKey, receiver: PublicKey, timestamp: i64) -> Self {
        Self {
            bank: BankAddress::derive(&sender, &receiver, timestamp),
            sender,
            receiver,
        }
    }
}

/// Identities whose signatures the ledger has verified for this call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignerSet(HashSet<PublicKey>);

impl SignerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, signer: PublicKey) {
        self.0.insert(signer);
    }

    pub fn contains(&self, identity: &PublicKey) -> bool {
        self.0.contains(identity)
    }
}

impl FromIterator<PublicKey> for SignerSet {
    fn from_iter<I: IntoIterator<Item = PublicKey>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Validates and executes `CreateBank` and `WithdrawBank` against a ledger.
#[derive(Debug)]
pub struct CustodyEngine<L> {
    ledger: L,
    config: EngineConfig,
}

impl<L: Ledger> CustodyEngine<L> {
    pub fn new(ledger: L) -> Self {
        Self::with_config(ledger, EngineConfig::default())
    }

    pub fn with_config(ledger: L, config: EngineConfig) -> Self {
        Self { ledger, config }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Lock `amount` from `accounts.sender` for `accounts.receiver` until
    /// `timestamp`.
    ///
    /// # Errors
    ///
    /// - [`CustodyError::MissingSigner`] unless both sender and receiver signed.
    /// - [`CustodyError::InvalidAmount`] if `amount` is zero.
    /// - [`CustodyError::WrongAccount`] if the address policy is
    ///   [`AddressPolicy::Derived`] and the bank address is not the derived one.
    /// - [`CustodyError::RecordAlreadyExists`] if the address is occupied or
    ///   was retired by an earlier release.
    /// - [`CustodyError::InsufficientFunds`] if the sender cannot cover `amount`.
    pub fn create_bank(
        &self,
        timestamp: i64,
        amount: u64,
        accounts: &BankAccounts,
        signers: &SignerSet,
    ) -> Result<BankRecord, CustodyError> {
        if !signers.contains(&accounts.sender) {
            return Err(CustodyError::MissingSigner {
                role: SignerRole::Sender,
            });
        }
        if !signers.contains(&accounts.receiver) {
            return Err(CustodyError::MissingSigner {
                role: SignerRole::Receiver,
            });
        }

        if amount == 0 {
            return Err(CustodyError::InvalidAmount);
        }

        if self.config.address_policy == AddressPolicy::Derived {
            let expected = BankAddress::derive(&accounts.sender, &accounts.receiver, timestamp);
            if accounts.bank != expected {
                return Err(CustodyError::WrongAccount {
                    reason: WrongAccountReason::AddressMismatch { expected },
                });
            }
        }

        if self.ledger.find_record(&accounts.bank)?.is_some()
            || self.ledger.is_retired(&accounts.bank)?
        {
            return Err(CustodyError::RecordAlreadyExists(accounts.bank));
        }

        let available = self.ledger.balance(&accounts.sender)?;
        if available < amount {
            return Err(CustodyError::InsufficientFunds {
                available,
                required: amount,
            });
        }

        let record = BankRecord::new(accounts.sender, accounts.receiver, amount, timestamp);
        self.ledger.commit(
            LedgerBatch::new()
                .debit(accounts.sender, amount)
                .credit_custody(accounts.bank, amount)
                .persist_record(accounts.bank, record.clone()),
        )?;

        tracing::info!(
            bank = %accounts.bank,
            sender = %accounts.sender,
            receiver = %accounts.receiver,
            amount,
            unlocks_at = timestamp,
            "bank created"
        );
        Ok(record)
    }

    /// Release the bank at `accounts.bank` to its recorded receiver, judged
    /// at time `now`. Returns the retired record.
    ///
    /// # Errors
    ///
    /// - [`CustodyError::RecordNotFound`] if no record is active at the address.
    /// - [`CustodyError::HandsTooWeak`] unless the sender account is the
    ///   recorded sender and signed the call.
    /// - [`CustodyError::WrongAccount`] if the receiver account differs from
    ///   the recorded receiver, or `now` is before the deadline.
    pub fn withdraw_bank(
        &self,
        now: i64,
        accounts: &BankAccounts,
        signers: &SignerSet,
    ) -> Result<BankRecord, CustodyError> {
        let record = self.ledger.fetch_record(&accounts.bank)?;

        if accounts.sender != record.sender || !signers.contains(&accounts.sender) {
            tracing::warn!(
                bank = %accounts.bank,
                caller = %accounts.sender,
                "withdrawal by non-depositor refused"
            );
            return Err(CustodyError::HandsTooWeak);
        }

        if accounts.receiver != record.receiver {
            return Err(CustodyError::WrongAccount {
                reason: WrongAccountReason::ReceiverMismatch {
                    expected: record.receiver,
                },
            });
        }

        if !record.is_unlocked(now) {
            tracing::warn!(
                bank = %accounts.bank,
                now,
                unlocks_at = record.timestamp,
                "withdrawal before deadline refused"
            );
            return Err(CustodyError::WrongAccount {
                reason: WrongAccountReason::TimelockActive {
                    now,
                    unlocks_at: record.timestamp,
                },
            });
        }

        self.ledger.commit(
            LedgerBatch::new()
                .release_custody(accounts.bank, record.receiver, record.amount)
                .retire_record(accounts.bank),
        )?;

        tracing::info!(
            bank = %accounts.bank,
            receiver = %record.receiver,
            amount = record.amount,
            "bank released"
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diamond_hands_protocol::crypto::keys::Keypair;
    use diamond_hands_protocol::storage::MemoryLedger;

    const DEADLINE: i64 = 1_700_000_000;

    struct Fixture {
        engine: CustodyEngine<MemoryLedger>,
        sender: PublicKey,
        receiver: PublicKey,
        accounts: BankAccounts,
        both: SignerSet,
    }

    fn fixture(balance: u64) -> Fixture {
        let sender = Keypair::generate().public_key();
        let receiver = Keypair::generate().public_key();
        let ledger = MemoryLedger::new().with_balance(sender, balance).unwrap();
        Fixture {
            engine: CustodyEngine::new(ledger),
            sender,
            receiver,
            accounts: BankAccounts::derived(sender, receiver, DEADLINE),
            both: [sender, receiver].into_iter().collect(),
        }
    }

    fn only(key: PublicKey) -> SignerSet {
        [key].into_iter().collect()
    }

    #[test]
    fn create_stores_all_four_fields() {
        let f = fixture(5_000);
        f.engine
            .create_bank(DEADLINE, 1_000, &f.accounts, &f.both)
            .unwrap();

        let record = f.engine.ledger().fetch_record(&f.accounts.bank).unwrap();
        assert_eq!(record, BankRecord::new(f.sender, f.receiver, 1_000, DEADLINE));
        assert_eq!(f.engine.ledger().balance(&f.sender).unwrap(), 4_000);
        assert_eq!(
            f.engine.ledger().custody_balance(&f.accounts.bank).unwrap(),
            Some(1_000)
        );
    }

    #[test]
    fn create_requires_both_signatures() {
        let f = fixture(5_000);
        let err = f
            .engine
            .create_bank(DEADLINE, 1_000, &f.accounts, &only(f.sender))
            .unwrap_err();
        assert!(matches!(
            err,
            CustodyError::MissingSigner {
                role: SignerRole::Receiver
            }
        ));

        let err = f
            .engine
            .create_bank(DEADLINE, 1_000, &f.accounts, &only(f.receiver))
            .unwrap_err();
        assert!(matches!(
            err,
            CustodyError::MissingSigner {
                role: SignerRole::Sender
            }
        ));
    }

    #[test]
    fn create_rejects_zero_amount() {
        let f = fixture(5_000);
        let err = f
            .engine
            .create_bank(DEADLINE, 0, &f.accounts, &f.both)
            .unwrap_err();
        assert!(matches!(err, CustodyError::InvalidAmount));
        assert!(f.engine.ledger().find_record(&f.accounts.bank).unwrap().is_none());
    }

    #[test]
    fn create_rejects_underived_address() {
        let f = fixture(5_000);
        let accounts = BankAccounts {
            bank: BankAddress::from(f.sender),
            ..f.accounts
        };
        let err = f
            .engine
            .create_bank(DEADLINE, 1_000, &accounts, &f.both)
            .unwrap_err();
        assert!(matches!(
            err,
            CustodyError::WrongAccount {
                reason: WrongAccountReason::AddressMismatch { expected }
            } if expected == f.accounts.bank
        ));
    }

    #[test]
    fn create_rejects_occupied_address() {
        let f = fixture(5_000);
        f.engine
            .create_bank(DEADLINE, 1_000, &f.accounts, &f.both)
            .unwrap();
        let err = f
            .engine
            .create_bank(DEADLINE, 1_000, &f.accounts, &f.both)
            .unwrap_err();
        assert!(matches!(err, CustodyError::RecordAlreadyExists(_)));
        assert_eq!(f.engine.ledger().balance(&f.sender).unwrap(), 4_000);
    }

    #[test]
    fn create_rejects_insufficient_funds() {
        let f = fixture(999);
        let err = f
            .engine
            .create_bank(DEADLINE, 1_000, &f.accounts, &f.both)
            .unwrap_err();
        assert!(matches!(
            err,
            CustodyError::InsufficientFunds {
                available: 999,
                required: 1_000
            }
        ));
        assert_eq!(f.engine.ledger().balance(&f.sender).unwrap(), 999);
    }

    #[test]
    fn create_may_lock_entire_balance() {
        let f = fixture(1_000);
        f.engine
            .create_bank(DEADLINE, 1_000, &f.accounts, &f.both)
            .unwrap();
        assert_eq!(f.engine.ledger().balance(&f.sender).unwrap(), 0);
        assert_eq!(
            f.engine.ledger().custody_balance(&f.accounts.bank).unwrap(),
            Some(1_000)
        );
    }

    #[test]
    fn released_address_cannot_be_created_again() {
        let f = fixture(5_000);
        f.engine
            .create_bank(DEADLINE, 1_000, &f.accounts, &f.both)
            .unwrap();
        f.engine
            .withdraw_bank(DEADLINE, &f.accounts, &only(f.sender))
            .unwrap();

        let err = f
            .engine
            .create_bank(DEADLINE, 1_000, &f.accounts, &f.both)
            .unwrap_err();
        assert!(matches!(err, CustodyError::RecordAlreadyExists(bank) if bank == f.accounts.bank));
        assert_eq!(f.engine.ledger().balance(&f.sender).unwrap(), 4_000);
        assert_eq!(f.engine.ledger().balance(&f.receiver).unwrap(), 1_000);
    }

    #[test]
    fn early_withdrawal_is_wrong_account() {
        let f = fixture(5_000);
        f.engine
            .create_bank(DEADLINE, 1_000, &f.accounts, &f.both)
            .unwrap();

        let err = f
            .engine
            .withdraw_bank(DEADLINE - 1, &f.accounts, &only(f.sender))
            .unwrap_err();
        assert!(matches!(
            err,
            CustodyError::WrongAccount {
                reason: WrongAccountReason::TimelockActive {
                    now,
                    unlocks_at: DEADLINE
                }
            } if now == DEADLINE - 1
        ));
        assert!(f.engine.ledger().find_record(&f.accounts.bank).unwrap().is_some());
    }

    #[test]
    fn receiver_cannot_withdraw_even_after_deadline() {
        let f = fixture(5_000);
        f.engine
            .create_bank(DEADLINE, 1_000, &f.accounts, &f.both)
            .unwrap();

        // Receiver posing as the sender slot.
        let accounts = BankAccounts {
            sender: f.receiver,
            ..f.accounts
        };
        let err = f
            .engine
            .withdraw_bank(DEADLINE + 10, &accounts, &only(f.receiver))
            .unwrap_err();
        assert!(matches!(err, CustodyError::HandsTooWeak));

        // Receiver signing while naming the real sender.
        let err = f
            .engine
            .withdraw_bank(DEADLINE + 10, &f.accounts, &only(f.receiver))
            .unwrap_err();
        assert!(matches!(err, CustodyError::HandsTooWeak));
    }

    #[test]
    fn identity_is_checked_before_timelock() {
        let f = fixture(5_000);
        f.engine
            .create_bank(DEADLINE, 1_000, &f.accounts, &f.both)
            .unwrap();
        let stranger = Keypair::generate().public_key();
        let accounts = BankAccounts {
            sender: stranger,
            ..f.accounts
        };
        let err = f
            .engine
            .withdraw_bank(DEADLINE - 500, &accounts, &only(stranger))
            .unwrap_err();
        assert!(matches!(err, CustodyError::HandsTooWeak));
    }

    #[test]
    fn withdrawal_pays_the_recorded_receiver_only() {
        let f = fixture(5_000);
        f.engine
            .create_bank(DEADLINE, 1_000, &f.accounts, &f.both)
            .unwrap();
        let thief = Keypair::generate().public_key();
        let accounts = BankAccounts {
            receiver: thief,
            ..f.accounts
        };
        let err = f
            .engine
            .withdraw_bank(DEADLINE, &accounts, &only(f.sender))
            .unwrap_err();
        assert!(matches!(
            err,
            CustodyError::WrongAccount {
                reason: WrongAccountReason::ReceiverMismatch { .. }
            }
        ));
        assert_eq!(f.engine.ledger().balance(&thief).unwrap(), 0);
    }

    #[test]
    fn release_at_deadline_moves_recorded_amount_once() {
        let f = fixture(5_000);
        f.engine
            .create_bank(DEADLINE, 1_000, &f.accounts, &f.both)
            .unwrap();

        let released = f
            .engine
            .withdraw_bank(DEADLINE, &f.accounts, &only(f.sender))
            .unwrap();
        assert_eq!(released.amount, 1_000);
        assert_eq!(f.engine.ledger().balance(&f.receiver).unwrap(), 1_000);
        assert_eq!(f.engine.ledger().balance(&f.sender).unwrap(), 4_000);
        assert_eq!(
            f.engine.ledger().custody_balance(&f.accounts.bank).unwrap(),
            None
        );

        let err = f
            .engine
            .withdraw_bank(DEADLINE + 1, &f.accounts, &only(f.sender))
            .unwrap_err();
        assert!(matches!(err, CustodyError::RecordNotFound(_)));
        assert_eq!(f.engine.ledger().balance(&f.receiver).unwrap(), 1_000);
    }

    #[test]
    fn withdraw_from_unknown_bank_is_not_found() {
        let f = fixture(0);
        let err = f
            .engine
            .withdraw_bank(DEADLINE, &f.accounts, &only(f.sender))
            .unwrap_err();
        assert!(matches!(err, CustodyError::RecordNotFound(bank) if bank == f.accounts.bank));
    }

    #[test]
    fn caller_chosen_policy_accepts_identity_address() {
        let sender = Keypair::generate().public_key();
        let receiver = Keypair::generate().public_key();
        let ledger = MemoryLedger::new().with_balance(sender, 1_000).unwrap();
        let engine = CustodyEngine::with_config(
            ledger,
            EngineConfig {
                address_policy: AddressPolicy::CallerChosen,
            },
        );
        let accounts = BankAccounts {
            bank: BankAddress::from(sender),
            sender,
            receiver,
        };
        let signers: SignerSet = [sender, receiver].into_iter().collect();

        engine.create_bank(DEADLINE, 1_000, &accounts, &signers).unwrap();
        assert_eq!(
            engine.ledger().fetch_record(&BankAddress::from(sender)).unwrap().amount,
            1_000
        );
    }

    #[test]
    fn error_messages_name_the_problem() {
        let reason = WrongAccountReason::TimelockActive {
            now: 5,
            unlocks_at: 10,
        };
        let err = CustodyError::WrongAccount { reason };
        assert_eq!(err.to_string(), "wrong account: timelock active until 10 (now 5)");
        assert!(CustodyError::HandsTooWeak.to_string().starts_with("hands too weak"));
    }
}
