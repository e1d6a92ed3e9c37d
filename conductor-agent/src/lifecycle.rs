// ABOUTME: Worker task lifecycle state machine.
// ABOUTME: Idle -> Starting -> Running -> {Exited | Killed}; both end states are terminal.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Constructed, no backend spawned yet
    Idle,
    /// Backend is being spawned and initialized
    Starting,
    /// Backend session is live and accepts input
    Running,
    /// Backend ended on its own
    Exited,
    /// Terminated via kill
    Killed,
}

impl LifecycleState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Exited | Self::Killed)
    }

    /// Whether `self -> next` is a legal transition.
    ///
    /// `Killed` is reachable from every non-terminal state. `Exited` requires a
    /// backend to have been spawned, so it is not reachable from `Idle`.
    pub fn can_transition_to(&self, next: LifecycleState) -> bool {
        match (self, next) {
            (Self::Idle, Self::Starting) => true,
            (Self::Starting, Self::Running) => true,
            (Self::Starting | Self::Running, Self::Exited) => true,
            (current, Self::Killed) => !current.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Exited => write!(f, "exited"),
            Self::Killed => write!(f, "killed"),
        }
    }
}
