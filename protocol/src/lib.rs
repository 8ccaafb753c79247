// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Diamond Hands Protocol Core Library
//!
//! Everything the custody engine stands on: who the parties are, what a
//! bank record looks like, and where balances and records live.
//!
//! ## Modules
//!
//! - **crypto**: Ed25519 identities, signatures, SHA-256/BLAKE3 helpers.
//! - **storage**: Bank records, the `Ledger` trait, in-memory and sled backends.
//! - **config**: Protocol constants shared by every crate.
//!
//! The engine itself lives in `diamond-hands-contracts`.

pub mod config;
pub mod crypto;
pub mod storage;
