//! # SledLedger: Persistent Ledger
//!
//! The on-disk [`Ledger`] backend, built on sled's embedded key-value
//! store.
//!
//! ## Tree Layout
//!
//! | Tree       | Key                     | Value                   |
//! |------------|-------------------------|-------------------------|
//! | `balances` | identity (32B)          | `u64` (8B BE)           |
//! | `custody`  | bank address (32B)      | `u64` (8B BE)           |
//! | `banks`    | bank address (32B)      | `bincode(BankRecord)`   |
//! | `retired`  | bank address (32B)      | empty (tombstone)       |
//!
//! ## Atomicity
//!
//! A batch runs inside one sled transaction spanning all four trees.
//! Op preconditions are evaluated against the transactional view, so a
//! concurrent commit that retired the same bank makes this one abort with
//! `RecordNotFound` instead of double-spending the custody slot. Conflicts
//! are retried by sled; business refusals abort without writing anything.

use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionalTree};
use sled::{Db, IVec, Transactional, Tree};
use std::path::Path;

use super::bank::{BankAddress, BankRecord};
use super::ledger::{apply_op, Ledger, LedgerBatch, LedgerError, LedgerResult, StateView};
use crate::config::{TREE_BALANCES, TREE_BANKS, TREE_CUSTODY, TREE_RETIRED};
use crate::crypto::keys::PublicKey;

// ---------------------------------------------------------------------------
// Encoding helpers
// ---------------------------------------------------------------------------

fn decode_amount(bytes: &IVec) -> LedgerResult<u64> {
    let arr: [u8; 8] = bytes
        .as_ref()
        .try_into()
        .map_err(|_| LedgerError::Serialization("invalid amount bytes".to_string()))?;
    Ok(u64::from_be_bytes(arr))
}

fn encode_record(record: &BankRecord) -> LedgerResult<Vec<u8>> {
    bincode::serialize(record).map_err(|e| LedgerError::Serialization(e.to_string()))
}

fn decode_record(bytes: &IVec) -> LedgerResult<BankRecord> {
    bincode::deserialize(bytes).map_err(|e| LedgerError::Serialization(e.to_string()))
}

// ---------------------------------------------------------------------------
// SledLedger
// ---------------------------------------------------------------------------

/// Persistent ledger over a sled database.
///
/// sled handles are cheap to clone and thread-safe, so a `SledLedger` can
/// be shared behind an `Arc` without extra locking.
#[derive(Debug, Clone)]
pub struct SledLedger {
    db: Db,
    balances: Tree,
    custody: Tree,
    banks: Tree,
    retired: Tree,
}

impl SledLedger {
    /// Open or create a ledger at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> LedgerResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// A ledger that lives in a temporary directory and is removed on drop.
    pub fn open_temporary() -> LedgerResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> LedgerResult<Self> {
        let balances = db.open_tree(TREE_BALANCES)?;
        let custody = db.open_tree(TREE_CUSTODY)?;
        let banks = db.open_tree(TREE_BANKS)?;
        let retired = db.open_tree(TREE_RETIRED)?;
        Ok(Self {
            db,
            balances,
            custody,
            banks,
            retired,
        })
    }

    /// Number of active bank records.
    pub fn record_count(&self) -> usize {
        self.banks.len()
    }

    /// Block until all writes are durable.
    pub fn flush(&self) -> LedgerResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

impl Ledger for SledLedger {
    fn balance(&self, owner: &PublicKey) -> LedgerResult<u64> {
        match self.balances.get(owner.as_bytes())? {
            Some(bytes) => decode_amount(&bytes),
            None => Ok(0),
        }
    }

    fn custody_balance(&self, bank: &BankAddress) -> LedgerResult<Option<u64>> {
        self.custody
            .get(bank.as_bytes())?
            .map(|bytes| decode_amount(&bytes))
            .transpose()
    }

    fn find_record(&self, bank: &BankAddress) -> LedgerResult<Option<BankRecord>> {
        self.banks
            .get(bank.as_bytes())?
            .map(|bytes| decode_record(&bytes))
            .transpose()
    }

    fn is_retired(&self, bank: &BankAddress) -> LedgerResult<bool> {
        Ok(self.retired.contains_key(bank.as_bytes())?)
    }

    fn commit(&self, batch: LedgerBatch) -> LedgerResult<()> {
        let trees = (&self.balances, &self.custody, &self.banks, &self.retired);
        let result = trees.transaction(
            |(balances, custody, banks, retired)| -> Result<(), TxError> {
                let mut view = SledTxView {
                    balances,
                    custody,
                    banks,
                    retired,
                };
                for op in batch.ops() {
                    apply_op(&mut view, op)?;
                }
                Ok(())
            },
        );

        match result {
            Ok(()) => {
                self.db.flush()?;
                tracing::debug!(ops = batch.len(), "sled ledger batch committed");
                Ok(())
            }
            Err(TransactionError::Abort(err)) => Err(err),
            Err(TransactionError::Storage(err)) => Err(LedgerError::Sled(err)),
        }
    }
}

// ---------------------------------------------------------------------------
// Transactional view
// ---------------------------------------------------------------------------

struct SledTxView<'a> {
    balances: &'a TransactionalTree,
    custody: &'a TransactionalTree,
    banks: &'a TransactionalTree,
    retired: &'a TransactionalTree,
}

type TxError = ConflictableTransactionError<LedgerError>;

impl StateView for SledTxView<'_> {
    type Error = TxError;

    fn reject(err: LedgerError) -> TxError {
        ConflictableTransactionError::Abort(err)
    }

    fn balance(&self, owner: &PublicKey) -> Result<u64, TxError> {
        match self.balances.get(owner.as_bytes())? {
            Some(bytes) => decode_amount(&bytes).map_err(Self::reject),
            None => Ok(0),
        }
    }

    fn set_balance(&mut self, owner: &PublicKey, amount: u64) -> Result<(), TxError> {
        self.balances
            .insert(&owner.as_bytes()[..], &amount.to_be_bytes()[..])?;
        Ok(())
    }

    fn custody(&self, bank: &BankAddress) -> Result<Option<u64>, TxError> {
        self.custody
            .get(bank.as_bytes())?
            .map(|bytes| decode_amount(&bytes))
            .transpose()
            .map_err(Self::reject)
    }

    fn set_custody(&mut self, bank: &BankAddress, amount: Option<u64>) -> Result<(), TxError> {
        match amount {
            Some(amount) => {
                self.custody
                    .insert(&bank.as_bytes()[..], &amount.to_be_bytes()[..])?;
            }
            None => {
                self.custody.remove(&bank.as_bytes()[..])?;
            }
        }
        Ok(())
    }

    fn record(&self, bank: &BankAddress) -> Result<Option<BankRecord>, TxError> {
        self.banks
            .get(bank.as_bytes())?
            .map(|bytes| decode_record(&bytes))
            .transpose()
            .map_err(Self::reject)
    }

    fn set_record(&mut self, bank: &BankAddress, record: Option<&BankRecord>) -> Result<(), TxError> {
        match record {
            Some(record) => {
                let bytes = encode_record(record).map_err(Self::reject)?;
                self.banks.insert(&bank.as_bytes()[..], bytes)?;
            }
            None => {
                self.banks.remove(&bank.as_bytes()[..])?;
            }
        }
        Ok(())
    }

    fn is_retired(&self, bank: &BankAddress) -> Result<bool, TxError> {
        Ok(self.retired.get(bank.as_bytes())?.is_some())
    }

    fn mark_retired(&mut self, bank: &BankAddress) -> Result<(), TxError> {
        self.retired.insert(&bank.as_bytes()[..], IVec::default())?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
