//! Orphan resolution
//!
//! An orphan is a ledger record of the current crawler that was not
//! processed during the session that just drained its frontier.

use crate::storage::{CrawlRecord, FrontierEntry, Ledger, StorageResult};
use serde::Deserialize;
use std::fmt;

/// Disposition of orphaned records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrphansStrategy {
    /// Re-submit orphans to the pipeline as if freshly discovered
    #[default]
    Process,
    /// Remove orphans from the ledger and the committer
    Delete,
    /// Leave orphans untouched
    Ignore,
}

impl fmt::Display for OrphansStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Process => f.write_str("process"),
            Self::Delete => f.write_str("delete"),
            Self::Ignore => f.write_str("ignore"),
        }
    }
}

/// What the coordinator must do for one orphan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrphanAction {
    Resubmit(FrontierEntry),
    Remove(String),
}

/// Scans the ledger for orphans and plans their disposition
///
/// Must only be called once every worker of the session has completed, so
/// the scan never races with a writer. `IGNORE` plans nothing and skips the
/// scan entirely.
pub fn plan_orphans(
    ledger: &dyn Ledger,
    strategy: OrphansStrategy,
) -> StorageResult<Vec<OrphanAction>> {
    if strategy == OrphansStrategy::Ignore {
        return Ok(Vec::new());
    }

    let mut actions = Vec::new();
    for record in ledger.scan(true) {
        let record: CrawlRecord = record?;
        let action = match strategy {
            OrphansStrategy::Process => OrphanAction::Resubmit(FrontierEntry::orphan(&record)),
            OrphansStrategy::Delete => OrphanAction::Remove(record.identity),
            OrphansStrategy::Ignore => continue,
        };
        actions.push(action);
    }

    tracing::debug!("Planned {} orphan actions ({})", actions.len(), strategy);
    Ok(actions)
}
