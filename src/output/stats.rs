//! Statistics generation from the crawl ledger
//!
//! This module provides functionality for extracting and displaying
//! ledger statistics for one crawler id.

use crate::state::CrawlStatus;
use crate::storage::{Ledger, SessionRecord, StorageResult};
use std::collections::HashMap;

/// Ledger statistics summary
#[derive(Debug, Clone)]
pub struct LedgerStatistics {
    /// Total number of records
    pub total_records: u64,

    /// Count of records by status
    pub records_by_status: HashMap<CrawlStatus, u64>,

    /// Records not processed by the latest session
    pub unprocessed: u64,

    /// References waiting in the persisted frontier
    pub frontier_pending: u64,

    /// Most recent session, if any
    pub last_session: Option<SessionRecord>,
}

impl LedgerStatistics {
    /// Records in a valid state (NEW, MODIFIED, UNCHANGED)
    pub fn valid(&self) -> u64 {
        self.records_by_status
            .iter()
            .filter(|(status, _)| status.is_valid())
            .map(|(_, count)| count)
            .sum()
    }
}

/// Loads statistics from a ledger
///
/// # Arguments
///
/// * `ledger` - The ledger to query
///
/// # Returns
///
/// * `Ok(LedgerStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to query the ledger
pub fn load_statistics(ledger: &dyn Ledger) -> StorageResult<LedgerStatistics> {
    let total_records = ledger.count_records()?;

    let mut records_by_status = ledger.count_by_status()?;
    records_by_status.retain(|_, count| *count > 0);

    let mut unprocessed = 0;
    for record in ledger.scan(true) {
        record?;
        unprocessed += 1;
    }

    Ok(LedgerStatistics {
        total_records,
        records_by_status,
        unprocessed,
        frontier_pending: ledger.frontier_len()?,
        last_session: ledger.latest_session()?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &LedgerStatistics) {
    println!("=== Ledger Statistics ===\n");

    match &stats.last_session {
        Some(session) => {
            println!("Last Session:");
            println!("  Id: {}", session.id);
            println!("  Crawler: {}", session.crawler_id);
            println!("  Started: {}", session.started_at);
            println!(
                "  Finished: {}",
                session.finished_at.as_deref().unwrap_or("-")
            );
            println!("  Status: {}", session.status.to_db_string());
            println!();
        }
        None => println!("No sessions recorded\n"),
    }

    println!("Overview:");
    println!("  Total records: {}", stats.total_records);
    println!("  Not processed by last session: {}", stats.unprocessed);
    println!("  Pending in frontier: {}", stats.frontier_pending);
    println!();

    println!("Records by Status:");
    // Sort statuses by count (descending)
    let mut status_counts: Vec<_> = stats.records_by_status.iter().collect();
    status_counts.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

    for (status, count) in status_counts {
        let percentage = if stats.total_records > 0 {
            (*count as f64 / stats.total_records as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", status, count, percentage);
    }
    println!();

    let valid = stats.valid();
    let valid_rate = if stats.total_records > 0 {
        (valid as f64 / stats.total_records as f64) * 100.0
    } else {
        0.0
    };

    println!(
        "Valid Rate: {:.1}% ({} / {} records in a valid state)",
        valid_rate, valid, stats.total_records
    );
}
