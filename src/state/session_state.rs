//! Lifecycle states of a crawl session

use std::fmt;

/// Represents where a crawl session is in its lifecycle
///
/// ```text
/// Created -> Running -> Finished
///                    -> Stopping -> Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Session built but not started
    Created,

    /// Workers are pulling references from the frontier
    Running,

    /// A stop was requested; in-flight references are completing
    Stopping,

    /// Terminal: the session stopped before draining the frontier
    Stopped,

    /// Terminal: the frontier drained
    Finished,
}

impl SessionState {
    /// Returns true if no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Finished)
    }

    /// Returns true if `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Running)
                | (Self::Running, Self::Stopping)
                | (Self::Running, Self::Finished)
                | (Self::Stopping, Self::Stopped)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Finished => "finished",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
