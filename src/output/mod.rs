//! Output module for reporting on the ledger
//!
//! This module handles:
//! - Loading per-status statistics from a ledger
//! - Printing them for the `--stats` command

pub mod stats;

pub use stats::{load_statistics, print_statistics, LedgerStatistics};
