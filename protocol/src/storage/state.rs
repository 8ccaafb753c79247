//! # In-Memory Ledger
//!
//! [`MemoryLedger`] keeps all state in hash maps behind a single
//! `parking_lot::RwLock`. Reads share the lock; a commit takes it
//! exclusively for the whole batch.
//!
//! ## Commit staging
//!
//! Ops are applied to a [`Staged`] overlay that reads through to the
//! committed state and buffers writes. Only when every op succeeds are the
//! buffered writes merged back. A failing op drops the overlay, so nothing
//! it touched is observable.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

use super::bank::{BankAddress, BankRecord};
use super::ledger::{apply_op, Ledger, LedgerBatch, LedgerError, LedgerResult, StateView};
use crate::crypto::keys::PublicKey;

// ---------------------------------------------------------------------------
// LedgerState
// ---------------------------------------------------------------------------

/// Committed ledger contents.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LedgerState {
    balances: HashMap<PublicKey, u64>,
    custody: HashMap<BankAddress, u64>,
    banks: HashMap<BankAddress, BankRecord>,
    retired: HashSet<BankAddress>,
}

impl LedgerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self, owner: &PublicKey) -> u64 {
        self.balances.get(owner).copied().unwrap_or(0)
    }

    pub fn custody(&self, bank: &BankAddress) -> Option<u64> {
        self.custody.get(bank).copied()
    }

    pub fn record(&self, bank: &BankAddress) -> Option<&BankRecord> {
        self.banks.get(bank)
    }

    pub fn is_retired(&self, bank: &BankAddress) -> bool {
        self.retired.contains(bank)
    }

    /// Number of active bank records.
    pub fn record_count(&self) -> usize {
        self.banks.len()
    }

    /// Sum of every spendable balance and every custody slot. Constant
    /// across any batch that contains no faucet credit.
    pub fn total_supply(&self) -> u128 {
        let spendable: u128 = self.balances.values().map(|v| *v as u128).sum();
        let held: u128 = self.custody.values().map(|v| *v as u128).sum();
        spendable + held
    }
}

// ---------------------------------------------------------------------------
// Staged overlay
// ---------------------------------------------------------------------------

/// Copy-on-write view over a [`LedgerState`] used while applying a batch.
struct Staged<'a> {
    base: &'a LedgerState,
    balances: HashMap<PublicKey, u64>,
    custody: HashMap<BankAddress, Option<u64>>,
    banks: HashMap<BankAddress, Option<BankRecord>>,
    retired: HashSet<BankAddress>,
}

/// Buffered writes of a fully applied batch.
struct Writes {
    balances: HashMap<PublicKey, u64>,
    custody: HashMap<BankAddress, Option<u64>>,
    banks: HashMap<BankAddress, Option<BankRecord>>,
    retired: HashSet<BankAddress>,
}

impl<'a> Staged<'a> {
    fn new(base: &'a LedgerState) -> Self {
        Self {
            base,
            balances: HashMap::new(),
            custody: HashMap::new(),
            banks: HashMap::new(),
            retired: HashSet::new(),
        }
    }

    fn into_writes(self) -> Writes {
        Writes {
            balances: self.balances,
            custody: self.custody,
            banks: self.banks,
            retired: self.retired,
        }
    }
}

impl StateView for Staged<'_> {
    type Error = LedgerError;

    fn reject(err: LedgerError) -> LedgerError {
        err
    }

    fn balance(&self, owner: &PublicKey) -> LedgerResult<u64> {
        Ok(self
            .balances
            .get(owner)
            .copied()
            .unwrap_or_else(|| self.base.balance(owner)))
    }

    fn set_balance(&mut self, owner: &PublicKey, amount: u64) -> LedgerResult<()> {
        self.balances.insert(*owner, amount);
        Ok(())
    }

    fn custody(&self, bank: &BankAddress) -> LedgerResult<Option<u64>> {
        Ok(match self.custody.get(bank) {
            Some(staged) => *staged,
            None => self.base.custody(bank),
        })
    }

    fn set_custody(&mut self, bank: &BankAddress, amount: Option<u64>) -> LedgerResult<()> {
        self.custody.insert(*bank, amount);
        Ok(())
    }

    fn record(&self, bank: &BankAddress) -> LedgerResult<Option<BankRecord>> {
        Ok(match self.banks.get(bank) {
            Some(staged) => staged.clone(),
            None => self.base.record(bank).cloned(),
        })
    }

    fn set_record(&mut self, bank: &BankAddress, record: Option<&BankRecord>) -> LedgerResult<()> {
        self.banks.insert(*bank, record.cloned());
        Ok(())
    }

    fn is_retired(&self, bank: &BankAddress) -> LedgerResult<bool> {
        Ok(self.retired.contains(bank) || self.base.is_retired(bank))
    }

    fn mark_retired(&mut self, bank: &BankAddress) -> LedgerResult<()> {
        self.retired.insert(*bank);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryLedger
// ---------------------------------------------------------------------------

/// Volatile [`Ledger`] backend. Used by tests, benchmarks and dry runs.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: RwLock<LedgerState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience: seed `owner` with `amount` via a faucet credit.
    pub fn with_balance(self, owner: PublicKey, amount: u64) -> LedgerResult<Self> {
        self.commit(LedgerBatch::new().credit(owner, amount))?;
        Ok(self)
    }

    /// A point-in-time copy of the committed state.
    pub fn snapshot(&self) -> LedgerState {
        self.state.read().clone()
    }
}

impl Ledger for MemoryLedger {
    fn balance(&self, owner: &PublicKey) -> LedgerResult<u64> {
        Ok(self.state.read().balance(owner))
    }

    fn custody_balance(&self, bank: &BankAddress) -> LedgerResult<Option<u64>> {
        Ok(self.state.read().custody(bank))
    }

    fn find_record(&self, bank: &BankAddress) -> LedgerResult<Option<BankRecord>> {
        Ok(self.state.read().record(bank).cloned())
    }

    fn is_retired(&self, bank: &BankAddress) -> LedgerResult<bool> {
        Ok(self.state.read().is_retired(bank))
    }

    fn commit(&self, batch: LedgerBatch) -> LedgerResult<()> {
        let mut state = self.state.write();

        let writes = {
            let mut staged = Staged::new(&state);
            for op in batch.ops() {
                apply_op(&mut staged, op)?;
            }
            staged.into_writes()
        };

        state.balances.extend(writes.balances);
        for (bank, held) in writes.custody {
            match held {
                Some(amount) => state.custody.insert(bank, amount),
                None => state.custody.remove(&bank),
            };
        }
        for (bank, record) in writes.banks {
            match record {
                Some(record) => state.banks.insert(bank, record),
                None => state.banks.remove(&bank),
            };
        }
        state.retired.extend(writes.retired);

        tracing::debug!(ops = batch.len(), "memory ledger batch committed");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::Keypair;

    fn parties() -> (PublicKey, PublicKey) {
        (
            Keypair::generate().public_key(),
            Keypair::generate().public_key(),
        )
    }

    #[test]
    fn unknown_identity_has_zero_balance() {
        let ledger = MemoryLedger::new();
        let (alice, _) = parties();
        assert_eq!(ledger.balance(&alice).unwrap(), 0);
    }

    #[test]
    fn deposit_batch_moves_funds_into_custody() {
        let (alice, bob) = parties();
        let ledger = MemoryLedger::new().with_balance(alice, 5_000).unwrap();
        let bank = BankAddress::derive(&alice, &bob, 100);

        ledger
            .commit(
                LedgerBatch::new()
                    .debit(alice, 1_000)
                    .credit_custody(bank, 1_000)
                    .persist_record(bank, BankRecord::new(alice, bob, 1_000, 100)),
            )
            .unwrap();

        assert_eq!(ledger.balance(&alice).unwrap(), 4_000);
        assert_eq!(ledger.custody_balance(&bank).unwrap(), Some(1_000));
        assert_eq!(ledger.fetch_record(&bank).unwrap().amount, 1_000);
        assert_eq!(ledger.snapshot().total_supply(), 5_000);
    }

    #[test]
    fn failing_op_rolls_back_whole_batch() {
        let (alice, bob) = parties();
        let ledger = MemoryLedger::new().with_balance(alice, 500).unwrap();
        let bank = BankAddress::derive(&alice, &bob, 100);
        let before = ledger.snapshot();

        // Custody credit and record persist come first; the debit fails last.
        let err = ledger
            .commit(
                LedgerBatch::new()
                    .credit_custody(bank, 1_000)
                    .persist_record(bank, BankRecord::new(alice, bob, 1_000, 100))
                    .debit(alice, 1_000),
            )
            .unwrap_err();

        assert!(matches!(err, LedgerError::InsufficientFunds { available: 500, .. }));
        assert_eq!(ledger.snapshot(), before);
    }

    #[test]
    fn persist_refuses_occupied_address() {
        let (alice, bob) = parties();
        let ledger = MemoryLedger::new();
        let bank = BankAddress::derive(&alice, &bob, 1);
        let record = BankRecord::new(alice, bob, 1, 1);

        ledger
            .commit(LedgerBatch::new().persist_record(bank, record.clone()))
            .unwrap();
        let err = ledger
            .commit(LedgerBatch::new().persist_record(bank, record))
            .unwrap_err();
        assert!(matches!(err, LedgerError::RecordAlreadyExists(addr) if addr == bank));
    }

    #[test]
    fn release_and_retire_close_the_slot() {
        let (alice, bob) = parties();
        let ledger = MemoryLedger::new().with_balance(alice, 1_000).unwrap();
        let bank = BankAddress::derive(&alice, &bob, 7);
        ledger
            .commit(
                LedgerBatch::new()
                    .debit(alice, 1_000)
                    .credit_custody(bank, 1_000)
                    .persist_record(bank, BankRecord::new(alice, bob, 1_000, 7)),
            )
            .unwrap();

        ledger
            .commit(
                LedgerBatch::new()
                    .release_custody(bank, bob, 1_000)
                    .retire_record(bank),
            )
            .unwrap();

        assert_eq!(ledger.balance(&bob).unwrap(), 1_000);
        assert_eq!(ledger.custody_balance(&bank).unwrap(), None);
        assert!(matches!(
            ledger.fetch_record(&bank),
            Err(LedgerError::RecordNotFound(_))
        ));
        assert_eq!(ledger.snapshot().record_count(), 0);
        assert!(ledger.is_retired(&bank).unwrap());
    }

    #[test]
    fn retired_address_cannot_hold_a_new_record() {
        let (alice, bob) = parties();
        let ledger = MemoryLedger::new().with_balance(alice, 2_000).unwrap();
        let bank = BankAddress::derive(&alice, &bob, 7);
        let record = BankRecord::new(alice, bob, 1_000, 7);
        let lock = LedgerBatch::new()
            .debit(alice, 1_000)
            .credit_custody(bank, 1_000)
            .persist_record(bank, record);

        ledger.commit(lock.clone()).unwrap();
        ledger
            .commit(
                LedgerBatch::new()
                    .release_custody(bank, bob, 1_000)
                    .retire_record(bank),
            )
            .unwrap();
        let before = ledger.snapshot();

        let err = ledger.commit(lock).unwrap_err();
        assert!(matches!(err, LedgerError::RecordAlreadyExists(addr) if addr == bank));
        assert_eq!(ledger.snapshot(), before);
        assert_eq!(ledger.balance(&alice).unwrap(), 1_000);
    }

    #[test]
    fn retire_sweeps_residual_custody_to_sender() {
        let (alice, bob) = parties();
        let ledger = MemoryLedger::new().with_balance(alice, 1_000).unwrap();
        let bank = BankAddress::derive(&alice, &bob, 7);
        ledger
            .commit(
                LedgerBatch::new()
                    .debit(alice, 1_000)
                    .credit_custody(bank, 1_000)
                    .persist_record(bank, BankRecord::new(alice, bob, 600, 7)),
            )
            .unwrap();

        ledger
            .commit(
                LedgerBatch::new()
                    .release_custody(bank, bob, 600)
                    .retire_record(bank),
            )
            .unwrap();

        assert_eq!(ledger.balance(&bob).unwrap(), 600);
        assert_eq!(ledger.balance(&alice).unwrap(), 400);
    }

    #[test]
    fn release_from_closed_slot_is_record_not_found() {
        let (alice, bob) = parties();
        let ledger = MemoryLedger::new();
        let bank = BankAddress::derive(&alice, &bob, 7);
        let err = ledger
            .commit(LedgerBatch::new().release_custody(bank, bob, 1))
            .unwrap_err();
        assert!(matches!(err, LedgerError::RecordNotFound(_)));
    }

    #[test]
    fn release_more_than_held_is_shortfall() {
        let (alice, bob) = parties();
        let ledger = MemoryLedger::new();
        let bank = BankAddress::derive(&alice, &bob, 7);
        ledger
            .commit(LedgerBatch::new().credit_custody(bank, 10))
            .unwrap();
        let err = ledger
            .commit(LedgerBatch::new().release_custody(bank, bob, 11))
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::CustodyShortfall {
                available: 10,
                required: 11,
                ..
            }
        ));
        assert_eq!(ledger.custody_balance(&bank).unwrap(), Some(10));
    }

    #[test]
    fn credit_overflow_is_rejected() {
        let (alice, _) = parties();
        let ledger = MemoryLedger::new().with_balance(alice, u64::MAX).unwrap();
        let err = ledger
            .commit(LedgerBatch::new().credit(alice, 1))
            .unwrap_err();
        assert!(matches!(err, LedgerError::BalanceOverflow));
        assert_eq!(ledger.balance(&alice).unwrap(), u64::MAX);
    }
}
