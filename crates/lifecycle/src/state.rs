//! Process lifecycle states.

use std::fmt;

use serde::Serialize;

/// Where the process is in its lifecycle.
///
/// Moves strictly forward: `Created -> Started -> Stopping -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    /// Collaborators composed, nothing started
    Created,
    /// Every subsystem started
    Started,
    /// Teardown in progress
    Stopping,
    /// Teardown finished
    Stopped,
}

impl LifecycleState {
    /// Whether the process should report itself alive.
    pub fn is_live(self) -> bool {
        self == LifecycleState::Started
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Created => write!(f, "CREATED"),
            LifecycleState::Started => write!(f, "STARTED"),
            LifecycleState::Stopping => write!(f, "STOPPING"),
            LifecycleState::Stopped => write!(f, "STOPPED"),
        }
    }
}
