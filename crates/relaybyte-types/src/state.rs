//! Task run states.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a task, task group or job.
///
/// Ordering used when folding states together: `Failed` and `Killed`
/// dominate `Running`, which dominates `Succeeded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Running,
    Succeeded,
    Failed,
    Killed,
}

impl RunState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Killed => "killed",
        }
    }

    #[must_use]
    pub fn is_running(self) -> bool {
        self == Self::Running
    }

    /// True for every terminal state.
    #[must_use]
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Killed)
    }

    /// True when the state carries a failure outcome.
    #[must_use]
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::Killed)
    }

    /// Fold two states. Any failure wins and is reported as `Failed`;
    /// otherwise any running side keeps the result running.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        if self.is_failure() || other.is_failure() {
            Self::Failed
        } else if self.is_running() || other.is_running() {
            Self::Running
        } else {
            Self::Succeeded
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [RunState; 4] = [
        RunState::Running,
        RunState::Succeeded,
        RunState::Failed,
        RunState::Killed,
    ];

    #[test]
    fn failure_dominates_everything() {
        for s in ALL {
            assert_eq!(RunState::Failed.merge(s), RunState::Failed);
            assert_eq!(s.merge(RunState::Killed), RunState::Failed);
        }
    }

    #[test]
    fn running_beats_succeeded() {
        assert_eq!(
            RunState::Running.merge(RunState::Succeeded),
            RunState::Running
        );
        assert_eq!(
            RunState::Succeeded.merge(RunState::Succeeded),
            RunState::Succeeded
        );
    }

    #[test]
    fn merge_is_symmetric() {
        for a in ALL {
            for b in ALL {
                assert_eq!(a.merge(b), b.merge(a));
            }
        }
    }

    #[test]
    fn finished_states() {
        assert!(!RunState::Running.is_finished());
        assert!(RunState::Killed.is_finished());
    }
}
