//! # Ledger Interface
//!
//! The custody engine never touches balances or records directly. It reads
//! through [`Ledger`] and describes every mutation as a [`LedgerBatch`],
//! which the ledger applies atomically: either every op in the batch lands
//! or none does.
//!
//! Each op re-checks its own precondition when it is applied (balance
//! covers a debit, record slot is free and never retired before persist,
//! custody slot exists before release). The engine validates the same things up front, but the
//! re-check is what makes two racing withdrawals against one bank resolve
//! to exactly one success: the loser finds the slot gone and gets
//! [`LedgerError::RecordNotFound`].
//!
//! Retirement leaves a tombstone. A retired address can never hold a
//! record again, so a co-signed `CreateBank` cannot be resubmitted after
//! its bank has been released.
//!
//! ## Ops
//!
//! | Op               | Effect                                                        |
//! |------------------|---------------------------------------------------------------|
//! | `Credit`         | Faucet credit to an identity (administrative).                |
//! | `Debit`          | Remove funds from an identity's spendable balance.            |
//! | `CreditCustody`  | Add funds to a bank's custody slot, opening it if needed.     |
//! | `PersistRecord`  | Store a new bank record. Fails if the address is occupied or retired. |
//! | `ReleaseCustody` | Move funds from a custody slot to an identity.                |
//! | `RetireRecord`   | Delete a record, close its custody slot and tombstone the address; any residual goes back to the record's sender. |

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::bank::{BankAddress, BankRecord};
use crate::crypto::keys::{PublicKey, Signature};
use crate::crypto::signatures;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Reasons a ledger refuses a read or a batch.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("insufficient funds for {owner}: have {available}, need {required}")]
    InsufficientFunds {
        owner: PublicKey,
        available: u64,
        required: u64,
    },

    #[error("bank {0} is active or was already retired")]
    RecordAlreadyExists(BankAddress),

    #[error("no bank record at {0}")]
    RecordNotFound(BankAddress),

    #[error("custody slot {bank} holds {available}, cannot release {required}")]
    CustodyShortfall {
        bank: BankAddress,
        available: u64,
        required: u64,
    },

    #[error("balance overflow")]
    BalanceOverflow,

    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

// ---------------------------------------------------------------------------
// Batches
// ---------------------------------------------------------------------------

/// A single ledger mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerOp {
    Credit {
        owner: PublicKey,
        amount: u64,
    },
    Debit {
        owner: PublicKey,
        amount: u64,
    },
    CreditCustody {
        bank: BankAddress,
        amount: u64,
    },
    PersistRecord {
        bank: BankAddress,
        record: BankRecord,
    },
    ReleaseCustody {
        bank: BankAddress,
        to: PublicKey,
        amount: u64,
    },
    RetireRecord {
        bank: BankAddress,
    },
}

/// An ordered set of ops committed as one atomic unit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LedgerBatch {
    ops: Vec<LedgerOp>,
}

impl LedgerBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn credit(mut self, owner: PublicKey, amount: u64) -> Self {
        self.ops.push(LedgerOp::Credit { owner, amount });
        self
    }

    pub fn debit(mut self, owner: PublicKey, amount: u64) -> Self {
        self.ops.push(LedgerOp::Debit { owner, amount });
        self
    }

    pub fn credit_custody(mut self, bank: BankAddress, amount: u64) -> Self {
        self.ops.push(LedgerOp::CreditCustody { bank, amount });
        self
    }

    pub fn persist_record(mut self, bank: BankAddress, record: BankRecord) -> Self {
        self.ops.push(LedgerOp::PersistRecord { bank, record });
        self
    }

    pub fn release_custody(mut self, bank: BankAddress, to: PublicKey, amount: u64) -> Self {
        self.ops.push(LedgerOp::ReleaseCustody { bank, to, amount });
        self
    }

    pub fn retire_record(mut self, bank: BankAddress) -> Self {
        self.ops.push(LedgerOp::RetireRecord { bank });
        self
    }

    pub fn ops(&self) -> &[LedgerOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Trusted store of balances, custody slots and bank records.
///
/// Implementations must make [`commit`](Self::commit) atomic and must
/// serialize commits against each other.
pub trait Ledger: Send + Sync {
    /// Spendable balance of `owner`. Unknown identities hold zero.
    fn balance(&self, owner: &PublicKey) -> LedgerResult<u64>;

    /// Balance of a bank's custody slot, `None` when the slot is closed.
    fn custody_balance(&self, bank: &BankAddress) -> LedgerResult<Option<u64>>;

    /// The record at `bank`, if one is active.
    fn find_record(&self, bank: &BankAddress) -> LedgerResult<Option<BankRecord>>;

    /// Whether a record at `bank` was released and retired.
    fn is_retired(&self, bank: &BankAddress) -> LedgerResult<bool>;

    /// Apply `batch` atomically.
    fn commit(&self, batch: LedgerBatch) -> LedgerResult<()>;

    /// The record at `bank`, or [`LedgerError::RecordNotFound`].
    fn fetch_record(&self, bank: &BankAddress) -> LedgerResult<BankRecord> {
        self.find_record(bank)?
            .ok_or(LedgerError::RecordNotFound(*bank))
    }

    /// Check that `identity` produced `signature` over `message`.
    fn verify_signer(&self, identity: &PublicKey, message: &[u8], signature: &Signature) -> bool {
        signatures::verify(identity, message, signature)
    }
}

// ---------------------------------------------------------------------------
// Op application
// ---------------------------------------------------------------------------

/// Read/write access to ledger state during a commit.
///
/// The error type is left to the backend so that a transactional store can
/// carry its own retry signals through op application; [`StateView::reject`]
/// lifts a business refusal into that type.
pub trait StateView {
    type Error;

    fn reject(err: LedgerError) -> Self::Error;

    fn balance(&self, owner: &PublicKey) -> Result<u64, Self::Error>;
    fn set_balance(&mut self, owner: &PublicKey, amount: u64) -> Result<(), Self::Error>;

    fn custody(&self, bank: &BankAddress) -> Result<Option<u64>, Self::Error>;
    fn set_custody(&mut self, bank: &BankAddress, amount: Option<u64>) -> Result<(), Self::Error>;

    fn record(&self, bank: &BankAddress) -> Result<Option<BankRecord>, Self::Error>;
    fn set_record(
        &mut self,
        bank: &BankAddress,
        record: Option<&BankRecord>,
    ) -> Result<(), Self::Error>;

    fn is_retired(&self, bank: &BankAddress) -> Result<bool, Self::Error>;
    fn mark_retired(&mut self, bank: &BankAddress) -> Result<(), Self::Error>;
}

fn add_balance<V: StateView>(view: &mut V, owner: &PublicKey, amount: u64) -> Result<(), V::Error> {
    let next = view
        .balance(owner)?
        .checked_add(amount)
        .ok_or_else(|| V::reject(LedgerError::BalanceOverflow))?;
    view.set_balance(owner, next)
}

/// Apply one op to `view`, checking its precondition first.
pub fn apply_op<V: StateView>(view: &mut V, op: &LedgerOp) -> Result<(), V::Error> {
    match op {
        LedgerOp::Credit { owner, amount } => add_balance(view, owner, *amount),

        LedgerOp::Debit { owner, amount } => {
            let available = view.balance(owner)?;
            let next = available.checked_sub(*amount).ok_or_else(|| {
                V::reject(LedgerError::InsufficientFunds {
                    owner: *owner,
                    available,
                    required: *amount,
                })
            })?;
            view.set_balance(owner, next)
        }

        LedgerOp::CreditCustody { bank, amount } => {
            let held = view.custody(bank)?.unwrap_or(0);
            let next = held
                .checked_add(*amount)
                .ok_or_else(|| V::reject(LedgerError::BalanceOverflow))?;
            view.set_custody(bank, Some(next))
        }

        LedgerOp::PersistRecord { bank, record } => {
            if view.record(bank)?.is_some() || view.is_retired(bank)? {
                return Err(V::reject(LedgerError::RecordAlreadyExists(*bank)));
            }
            view.set_record(bank, Some(record))
        }

        LedgerOp::ReleaseCustody { bank, to, amount } => {
            let held = view
                .custody(bank)?
                .ok_or_else(|| V::reject(LedgerError::RecordNotFound(*bank)))?;
            let remaining = held.checked_sub(*amount).ok_or_else(|| {
                V::reject(LedgerError::CustodyShortfall {
                    bank: *bank,
                    available: held,
                    required: *amount,
                })
            })?;
            view.set_custody(bank, Some(remaining))?;
            add_balance(view, to, *amount)
        }

        LedgerOp::RetireRecord { bank } => {
            let record = view
                .record(bank)?
                .ok_or_else(|| V::reject(LedgerError::RecordNotFound(*bank)))?;
            let residual = view.custody(bank)?.unwrap_or(0);
            if residual > 0 {
                add_balance(view, &record.sender, residual)?;
            }
            view.set_custody(bank, None)?;
            view.set_record(bank, None)?;
            view.mark_retired(bank)
        }
    }
}
