//! # Diamond Hands Contracts
//!
//! The custody program: a sender locks funds for a receiver behind a
//! deadline, and only the sender can release them, only after it.
//!
//! - **diamond_hands**: the custody engine: `CreateBank` and `WithdrawBank`
//!   validation and execution, error taxonomy, account wiring.
//! - **runtime**: signed instruction envelope, signer verification through
//!   the ledger, dispatch, receipts.
//!
//! ## Design Principles
//!
//! 1. Validate everything with reads, then commit one atomic ledger batch.
//! 2. The amount that leaves custody is the recorded amount. Withdrawal
//!    takes no amount argument.
//! 3. Release deletes the record. Double release is structurally impossible.
//! 4. Time is an input, never a clock read.

pub mod diamond_hands;
pub mod runtime;

pub use diamond_hands::{
    AddressPolicy, BankAccounts, CustodyEngine, CustodyError, EngineConfig, SignerRole, SignerSet,
    WrongAccountReason,
};
pub use runtime::{Instruction, Receipt, ReceiptKind, Runtime, SignedInstruction};
