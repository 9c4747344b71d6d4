//! Exception escalation: which per-reference errors stop the session

use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;

/// Tagged kind of an error raised in the per-reference pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Checksum,
    Fetch,
    Filter,
    Import,
    Commit,
    /// Matches every kind when used in a stop-on set
    Any,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Checksum => "checksum",
            Self::Fetch => "fetch",
            Self::Filter => "filter",
            Self::Import => "import",
            Self::Commit => "commit",
            Self::Any => "any",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The configured stop-on set
#[derive(Debug, Clone, Default)]
pub struct StopPolicy {
    kinds: HashSet<ErrorKind>,
}

impl StopPolicy {
    pub fn new(kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
        }
    }

    /// Returns true if an error of `kind` must stop the whole session
    pub fn is_fatal(&self, kind: ErrorKind) -> bool {
        self.kinds.contains(&ErrorKind::Any) || self.kinds.contains(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}
