//! # Runtime
//!
//! The execution environment around the custody engine. A client submits a
//! [`SignedInstruction`]: the instruction, the accounts it touches, and the
//! signatures collected for it. The runtime asks the ledger to verify each
//! signature, hands the resulting [`SignerSet`] to the engine, and returns a
//! [`Receipt`] on success.
//!
//! ## Signing message
//!
//! ```text
//! message = version_byte || bincode((instruction, accounts))
//! id      = BLAKE3(message)
//! ```
//!
//! Every signer signs the same message. Replaying a landed instruction
//! fails: a released bank's address is retired, so neither its
//! `CreateBank` nor its `WithdrawBank` can land twice.
//!
//! A signature that fails to verify rejects the whole instruction; it is
//! never silently dropped. Signatures from keys that are not one of the
//! instruction's accounts are ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use diamond_hands_protocol::config::INSTRUCTION_ENCODING_VERSION;
use diamond_hands_protocol::crypto::hash::blake3_hash;
use diamond_hands_protocol::crypto::keys::{Keypair, PublicKey, Signature};
use diamond_hands_protocol::crypto::signatures;
use diamond_hands_protocol::storage::{BankAddress, Ledger};

use crate::diamond_hands::{BankAccounts, CustodyEngine, CustodyError, SignerSet};

// ---------------------------------------------------------------------------
// Instructions
// ---------------------------------------------------------------------------

/// The two operations the custody program accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    /// Lock `amount` until `timestamp`. Sender and receiver must both sign.
    CreateBank { timestamp: i64, amount: u64 },
    /// Release the bank, judged at `timestamp`. The sender must sign.
    WithdrawBank { timestamp: i64 },
}

/// An instruction together with its accounts and collected signatures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedInstruction {
    pub instruction: Instruction,
    pub accounts: BankAccounts,
    pub signatures: Vec<(PublicKey, Signature)>,
}

impl SignedInstruction {
    /// An instruction with no signatures yet.
    pub fn new(instruction: Instruction, accounts: BankAccounts) -> Self {
        Self {
            instruction,
            accounts,
            signatures: Vec::new(),
        }
    }

    /// The bytes every signer signs.
    pub fn message(&self) -> Result<Vec<u8>, CustodyError> {
        let body = bincode::serialize(&(&self.instruction, &self.accounts))
            .map_err(|e| CustodyError::Encoding(e.to_string()))?;
        let mut message = Vec::with_capacity(1 + body.len());
        message.push(INSTRUCTION_ENCODING_VERSION);
        message.extend_from_slice(&body);
        Ok(message)
    }

    /// Hex-encoded BLAKE3 digest of the signing message.
    pub fn id(&self) -> Result<String, CustodyError> {
        Ok(hex::encode(blake3_hash(&self.message()?)))
    }

    /// Append `keypair`'s signature over the signing message.
    pub fn sign(mut self, keypair: &Keypair) -> Result<Self, CustodyError> {
        let signature = signatures::sign(keypair, &self.message()?);
        self.signatures.push((keypair.public_key(), signature));
        Ok(self)
    }
}

// ---------------------------------------------------------------------------
// Receipts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptKind {
    BankCreated,
    BankReleased,
}

/// Proof that an instruction landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: Uuid,
    /// Hex BLAKE3 digest of the signing message.
    pub instruction_id: String,
    pub kind: ReceiptKind,
    pub bank: BankAddress,
    pub sender: PublicKey,
    pub receiver: PublicKey,
    /// Amount moved into custody, or out of it to the receiver.
    pub amount: u64,
    /// The bank's deadline.
    pub unlocks_at: i64,
    pub processed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

/// Verifies signers and dispatches instructions to a [`CustodyEngine`].
#[derive(Debug)]
pub struct Runtime<L> {
    engine: CustodyEngine<L>,
}

impl<L: Ledger> Runtime<L> {
    pub fn new(engine: CustodyEngine<L>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &CustodyEngine<L> {
        &self.engine
    }

    pub fn ledger(&self) -> &L {
        self.engine.ledger()
    }

    /// Authenticate and execute `ix`.
    pub fn process(&self, ix: &SignedInstruction) -> Result<Receipt, CustodyError> {
        let message = ix.message()?;
        let instruction_id = hex::encode(blake3_hash(&message));
        let span = tracing::info_span!("instruction", id = %&instruction_id[..16]);
        let _guard = span.enter();

        let signers = self.verified_signers(ix, &message)?;

        let (kind, record) = match ix.instruction {
            Instruction::CreateBank { timestamp, amount } => (
                ReceiptKind::BankCreated,
                self.engine
                    .create_bank(timestamp, amount, &ix.accounts, &signers),
            ),
            Instruction::WithdrawBank { timestamp } => (
                ReceiptKind::BankReleased,
                self.engine.withdraw_bank(timestamp, &ix.accounts, &signers),
            ),
        };
        let record = record.map_err(|err| {
            tracing::warn!(error = %err, "instruction rejected");
            err
        })?;

        Ok(Receipt {
            id: Uuid::new_v4(),
            instruction_id,
            kind,
            bank: ix.accounts.bank,
            sender: record.sender,
            receiver: record.receiver,
            amount: record.amount,
            unlocks_at: record.timestamp,
            processed_at: Utc::now(),
        })
    }

    fn verified_signers(
        &self,
        ix: &SignedInstruction,
        message: &[u8],
    ) -> Result<SignerSet, CustodyError> {
        let mut signers = SignerSet::new();
        for (signer, signature) in &ix.signatures {
            if !self.ledger().verify_signer(signer, message, signature) {
                return Err(CustodyError::InvalidSignature { signer: *signer });
            }
            if *signer == ix.accounts.sender || *signer == ix.accounts.receiver {
                signers.insert(*signer);
            }
        }
        Ok(signers)
    }
}
