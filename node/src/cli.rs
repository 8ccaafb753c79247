//! # CLI Interface
//!
//! Defines the command-line argument structure for `diamond-hands` using
//! `clap` derive. Every subcommand operates on the sled ledger under the
//! data directory.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use diamond_hands_protocol::config::DEFAULT_DATA_DIR;
use diamond_hands_protocol::crypto::keys::PublicKey;
use diamond_hands_protocol::storage::BankAddress;

use crate::logging::LogFormat;

/// Time-locked custody on a local ledger.
///
/// A sender locks funds for a receiver until a deadline. Only the sender can
/// release them, and only once the deadline has passed.
#[derive(Parser, Debug)]
#[command(
    name = "diamond-hands",
    about = "Time-locked two-party custody ledger",
    version,
    propagate_version = true
)]
pub struct DiamondHandsCli {
    /// Directory holding the ledger database.
    #[arg(
        long,
        short = 'd',
        env = "DIAMOND_DATA_DIR",
        default_value = DEFAULT_DATA_DIR,
        global = true
    )]
    pub data_dir: PathBuf,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    pub log_format: LogFormat,

    /// Default log level when `RUST_LOG` is unset.
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the `diamond-hands` binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate a keypair and write its secret key, hex-encoded, to a file.
    Keygen(KeygenArgs),
    /// Credit an identity out of thin air. Local ledgers only.
    Airdrop(AirdropArgs),
    /// Print the spendable balance of an identity.
    Balance(BalanceArgs),
    /// Lock funds for a receiver until a deadline.
    CreateBank(CreateBankArgs),
    /// Release a bank to its receiver once the deadline has passed.
    WithdrawBank(WithdrawBankArgs),
    /// Print the record and custody balance at a bank address.
    ShowBank(ShowBankArgs),
    /// Print version information and exit.
    Version,
}

#[derive(Args, Debug)]
pub struct KeygenArgs {
    /// Where to write the secret key.
    #[arg(long, short = 'o')]
    pub out: PathBuf,

    /// Overwrite `--out` if it already exists.
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct AirdropArgs {
    /// Recipient identity, base58 or hex.
    #[arg(long)]
    pub to: PublicKey,

    #[arg(long)]
    pub amount: u64,
}

#[derive(Args, Debug)]
pub struct BalanceArgs {
    /// Identity to query, base58 or hex.
    #[arg(long)]
    pub of: PublicKey,
}

#[derive(Args, Debug)]
pub struct CreateBankArgs {
    /// Secret key file of the sender, who funds the bank.
    #[arg(long)]
    pub sender_key: PathBuf,

    /// Secret key file of the receiver, who co-signs the agreement.
    #[arg(long)]
    pub receiver_key: PathBuf,

    /// Amount to lock.
    #[arg(long)]
    pub amount: u64,

    /// Unlock time in Unix seconds.
    #[arg(long, allow_negative_numbers = true)]
    pub timestamp: i64,

    /// Explicit bank address. When omitted, the address is derived from the
    /// sender, receiver and timestamp.
    #[arg(long)]
    pub bank: Option<BankAddress>,
}

#[derive(Args, Debug)]
pub struct WithdrawBankArgs {
    /// Secret key file of the bank's sender.
    #[arg(long)]
    pub sender_key: PathBuf,

    /// Receiver identity recorded on the bank.
    #[arg(long)]
    pub receiver: PublicKey,

    /// Bank address to release.
    #[arg(long)]
    pub bank: BankAddress,

    /// Time to judge the deadline against, in Unix seconds. Defaults to now.
    #[arg(long, allow_negative_numbers = true)]
    pub timestamp: Option<i64>,
}

#[derive(Args, Debug)]
pub struct ShowBankArgs {
    /// Bank address to inspect.
    #[arg(long)]
    pub bank: BankAddress,
}
