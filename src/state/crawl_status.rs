/// Crawl status definitions for tracking incremental crawl decisions
///
/// This module defines the status a reference is left in after a crawl run.
use serde::{Deserialize, Serialize};
use std::fmt;

/// The outcome recorded for a reference at the end of its processing
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlStatus {
    // ===== Valid States =====
    /// First sighting of this reference
    New,

    /// Reference was seen before and its checksums changed
    Modified,

    /// Reference was seen before and its checksums did not change
    Unchanged,

    // ===== Gone =====
    /// The fetch layer reported the reference as not found
    Deleted,

    // ===== Spoiled States =====
    /// Processing failed for this reference in the current run
    Error,

    /// A filter rejected the reference in the current run
    Rejected,
}

impl CrawlStatus {
    /// Returns true for NEW, MODIFIED and UNCHANGED
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::New | Self::Modified | Self::Unchanged)
    }

    /// Returns true if the reference failed or was rejected
    pub fn is_spoiled(&self) -> bool {
        matches!(self, Self::Error | Self::Rejected)
    }

    /// Returns true if the document should be sent to the committer
    pub fn is_new_or_modified(&self) -> bool {
        matches!(self, Self::New | Self::Modified)
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Modified => "modified",
            Self::Unchanged => "unchanged",
            Self::Deleted => "deleted",
            Self::Error => "error",
            Self::Rejected => "rejected",
        }
    }

    /// Parses a status from its database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "new" => Some(Self::New),
            "modified" => Some(Self::Modified),
            "unchanged" => Some(Self::Unchanged),
            "deleted" => Some(Self::Deleted),
            "error" => Some(Self::Error),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Returns all possible statuses
    pub fn all_statuses() -> Vec<Self> {
        vec![
            Self::New,
            Self::Modified,
            Self::Unchanged,
            Self::Deleted,
            Self::Error,
            Self::Rejected,
        ]
    }
}

impl fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
