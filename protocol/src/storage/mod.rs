//! # Storage Module
//!
//! The bank record data model and the ledgers that hold it.
//!
//! ## Architecture
//!
//! ```text
//! bank.rs   - BankRecord, BankAddress and address derivation
//! ledger.rs - Ledger trait, LedgerBatch ops, shared op application
//! state.rs  - MemoryLedger (RwLock over hash maps)
//! db.rs     - SledLedger (sled trees, transactional commits)
//! ```
//!
//! ## Data Flow
//!
//! ```text
//! engine ──reads──▶ Ledger ◀──commit(LedgerBatch)── engine
//!                     │
//!          ┌──────────┴──────────┐
//!     MemoryLedger          SledLedger
//! ```
//!
//! Both backends share [`ledger::apply_op`], so an op means the same thing
//! regardless of where it is stored.

pub mod bank;
pub mod db;
pub mod ledger;
pub mod state;

pub use bank::{BankAddress, BankRecord};
pub use db::SledLedger;
pub use ledger::{Ledger, LedgerBatch, LedgerError, LedgerOp, LedgerResult};
pub use state::{LedgerState, MemoryLedger};
