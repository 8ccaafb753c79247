// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Diamond Hands CLI
//!
//! Entry point for the `diamond-hands` binary. Parses CLI arguments,
//! initializes logging, opens the sled ledger under the data directory and
//! runs one command against it.
//!
//! - `keygen`        - write a fresh secret key to a file
//! - `airdrop`       - credit an identity on the local ledger
//! - `balance`       - print an identity's spendable balance
//! - `create-bank`   - lock funds for a receiver until a deadline
//! - `withdraw-bank` - release a bank whose deadline has passed
//! - `show-bank`     - print a bank record and its custody balance
//! - `version`       - print build version information
//!
//! Results are printed to stdout as JSON; logs go to stderr.

mod cli;
mod logging;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use serde_json::{json, Value};
use std::path::Path;

use diamond_hands_contracts::{
    AddressPolicy, BankAccounts, CustodyEngine, EngineConfig, Instruction, Receipt, Runtime,
    SignedInstruction,
};
use diamond_hands_protocol::config::LEDGER_DIR_NAME;
use diamond_hands_protocol::crypto::keys::Keypair;
use diamond_hands_protocol::storage::{BankRecord, Ledger, LedgerBatch, SledLedger};

use cli::{Commands, DiamondHandsCli};

fn main() -> Result<()> {
    let cli = DiamondHandsCli::parse();

    if let Commands::Version = cli.command {
        print_version();
        return Ok(());
    }

    logging::init_logging(&cli.log_level, cli.log_format);

    let output = execute(&cli.data_dir, cli.command)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Run one command against the ledger in `data_dir`.
fn execute(data_dir: &Path, command: Commands) -> Result<Value> {
    match command {
        Commands::Keygen(args) => keygen(&args),
        Commands::Airdrop(args) => airdrop(&open_ledger(data_dir)?, &args),
        Commands::Balance(args) => {
            let ledger = open_ledger(data_dir)?;
            let balance = ledger.balance(&args.of)?;
            Ok(json!({ "identity": args.of.to_string(), "balance": balance }))
        }
        Commands::CreateBank(args) => create_bank(open_ledger(data_dir)?, &args),
        Commands::WithdrawBank(args) => withdraw_bank(open_ledger(data_dir)?, &args),
        Commands::ShowBank(args) => show_bank(&open_ledger(data_dir)?, &args),
        Commands::Version => Ok(json!({ "version": env!("CARGO_PKG_VERSION") })),
    }
}

fn open_ledger(data_dir: &Path) -> Result<SledLedger> {
    let path = data_dir.join(LEDGER_DIR_NAME);
    std::fs::create_dir_all(&path)
        .with_context(|| format!("failed to create ledger directory: {}", path.display()))?;
    let ledger = SledLedger::open(&path)
        .with_context(|| format!("failed to open ledger at {}", path.display()))?;
    tracing::debug!(path = %path.display(), banks = ledger.record_count(), "ledger opened");
    Ok(ledger)
}

fn read_keypair(path: &Path) -> Result<Keypair> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read key file {}", path.display()))?;
    Keypair::from_hex(contents.trim())
        .with_context(|| format!("malformed key file {}", path.display()))
}

fn keygen(args: &cli::KeygenArgs) -> Result<Value> {
    if args.out.exists() && !args.force {
        bail!(
            "{} already exists; pass --force to overwrite",
            args.out.display()
        );
    }

    let keypair = Keypair::generate();
    std::fs::write(&args.out, format!("{}\n", keypair.to_hex()))
        .with_context(|| format!("failed to write key to {}", args.out.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&args.out, std::fs::Permissions::from_mode(0o600))?;
    }

    let public_key = keypair.public_key();
    tracing::info!(
        public_key = %public_key,
        key_path = %args.out.display(),
        "keypair generated"
    );
    Ok(json!({
        "public_key": public_key.to_string(),
        "key_path": args.out.display().to_string(),
    }))
}

fn airdrop(ledger: &SledLedger, args: &cli::AirdropArgs) -> Result<Value> {
    ledger
        .commit(LedgerBatch::new().credit(args.to, args.amount))
        .context("airdrop failed")?;
    let balance = ledger.balance(&args.to)?;
    tracing::info!(to = %args.to, amount = args.amount, balance, "airdrop credited");
    Ok(json!({ "identity": args.to.to_string(), "balance": balance }))
}

fn create_bank(ledger: SledLedger, args: &cli::CreateBankArgs) -> Result<Value> {
    let sender = read_keypair(&args.sender_key)?;
    let receiver = read_keypair(&args.receiver_key)?;

    let (accounts, address_policy) = match args.bank {
        Some(bank) => (
            BankAccounts {
                bank,
                sender: sender.public_key(),
                receiver: receiver.public_key(),
            },
            AddressPolicy::CallerChosen,
        ),
        None => (
            BankAccounts::derived(sender.public_key(), receiver.public_key(), args.timestamp),
            AddressPolicy::Derived,
        ),
    };

    let runtime = Runtime::new(CustodyEngine::with_config(
        ledger,
        EngineConfig { address_policy },
    ));
    let ix = SignedInstruction::new(
        Instruction::CreateBank {
            timestamp: args.timestamp,
            amount: args.amount,
        },
        accounts,
    )
    .sign(&sender)?
    .sign(&receiver)?;

    let receipt = runtime.process(&ix).context("create-bank rejected")?;
    Ok(receipt_json(&receipt))
}

fn withdraw_bank(ledger: SledLedger, args: &cli::WithdrawBankArgs) -> Result<Value> {
    let sender = read_keypair(&args.sender_key)?;
    let now = args.timestamp.unwrap_or_else(|| Utc::now().timestamp());

    let accounts = BankAccounts {
        bank: args.bank,
        sender: sender.public_key(),
        receiver: args.receiver,
    };
    let runtime = Runtime::new(CustodyEngine::new(ledger));
    let ix = SignedInstruction::new(Instruction::WithdrawBank { timestamp: now }, accounts)
        .sign(&sender)?;

    let receipt = runtime.process(&ix).context("withdraw-bank rejected")?;
    Ok(receipt_json(&receipt))
}

fn show_bank(ledger: &SledLedger, args: &cli::ShowBankArgs) -> Result<Value> {
    let record = ledger
        .fetch_record(&args.bank)
        .with_context(|| format!("no bank at {}", args.bank))?;
    let custody = ledger.custody_balance(&args.bank)?;
    Ok(json!({
        "bank": args.bank.to_string(),
        "record": record_json(&record),
        "custody": custody,
    }))
}

fn record_json(record: &BankRecord) -> Value {
    json!({
        "sender": record.sender.to_string(),
        "receiver": record.receiver.to_string(),
        "amount": record.amount,
        "timestamp": record.timestamp,
    })
}

fn receipt_json(receipt: &Receipt) -> Value {
    json!({
        "id": receipt.id.to_string(),
        "instruction_id": receipt.instruction_id,
        "kind": receipt.kind,
        "bank": receipt.bank.to_string(),
        "sender": receipt.sender.to_string(),
        "receiver": receipt.receiver.to_string(),
        "amount": receipt.amount,
        "unlocks_at": receipt.unlocks_at,
        "processed_at": receipt.processed_at.to_rfc3339(),
    })
}

fn print_version() {
    println!("diamond-hands {}", env!("CARGO_PKG_VERSION"));
    println!(
        "protocol      {}",
        diamond_hands_protocol::config::PROTOCOL_VERSION
    );
    println!(
        "signing       {}",
        diamond_hands_protocol::config::SIGNING_ALGORITHM
    );
}
