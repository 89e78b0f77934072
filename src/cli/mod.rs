//! Command-line interface
//!
//! Argument parsing for the ledger binary; `main.rs` dispatches the parsed
//! commands onto the chain, the UTXO index and the wallet file.

pub mod commands;

pub use commands::{Command, Opt};
