//! Coordinator state definitions.

use std::fmt;

/// Coordinator operational state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// Coordinator is starting up.
    Starting,
    /// Coordinator is running and accepting requests.
    Running,
    /// Coordinator is shutting down, not accepting new writes.
    ShuttingDown,
    /// Coordinator is stopped.
    Stopped,
}

impl CoordinatorState {
    /// Check if mutating requests are accepted. Reads are served in every state.
    pub fn accepts_writes(&self) -> bool {
        matches!(self, CoordinatorState::Starting | CoordinatorState::Running)
    }

    /// Check if the coordinator is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CoordinatorState::Stopped)
    }
}

impl fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CoordinatorState::Starting => "starting",
            CoordinatorState::Running => "running",
            CoordinatorState::ShuttingDown => "shutting down",
            CoordinatorState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}
