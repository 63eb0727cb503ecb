//! Worker lifecycle state machine

use std::fmt;

use serde::Serialize;

use crate::{Error, Result};

/// Lifecycle state of an offline worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    /// Precaching the manifest
    Installing,
    /// Installed, waiting to take over
    Installed,
    /// Deleting stale buckets
    Activating,
    /// Serving fetches
    Activated,
    /// Failed to install or replaced
    Redundant,
}

impl WorkerState {
    /// Lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Activating => "activating",
            Self::Activated => "activated",
            Self::Redundant => "redundant",
        }
    }

    /// Whether `next` may follow `self`
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Installing, Self::Installed)
                | (Self::Installed, Self::Activating)
                | (Self::Activating, Self::Activated)
                | (
                    Self::Installing | Self::Installed | Self::Activating | Self::Activated,
                    Self::Redundant
                )
        )
    }

    /// Validated transition
    pub fn transition(self, next: Self) -> Result<Self> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(Error::InvalidTransition {
                from: self.as_str(),
                to: next.as_str(),
            })
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_is_linear() {
        let state = WorkerState::Installing
            .transition(WorkerState::Installed)
            .and_then(|s| s.transition(WorkerState::Activating))
            .and_then(|s| s.transition(WorkerState::Activated))
            .unwrap();
        assert_eq!(state, WorkerState::Activated);
    }

    #[test]
    fn cannot_skip_install() {
        let err = WorkerState::Installing
            .transition(WorkerState::Activated)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid worker transition from installing to activated"
        );
    }

    #[test]
    fn redundant_is_terminal() {
        for next in [
            WorkerState::Installing,
            WorkerState::Installed,
            WorkerState::Activating,
            WorkerState::Activated,
            WorkerState::Redundant,
        ] {
            assert!(!WorkerState::Redundant.can_transition_to(next));
        }
        assert!(WorkerState::Activated.can_transition_to(WorkerState::Redundant));
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&WorkerState::Activated).unwrap(),
            "\"activated\""
        );
    }
}
