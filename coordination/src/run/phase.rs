//! Run controller phases, transitions, and the transition trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Phase of a coordination run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// Run created, nothing executed.
    Pending,
    /// Coordinator is building the plan.
    Classifying,
    /// Pairs are running in plan order.
    ExecutingPairs,
    /// Coordinator is ruling on escalated conflicts.
    ResolvingConflicts,
    /// Coordinator is aggregating the final verdict.
    Finalizing,
    /// Failed pairs outnumber approved ones, or the run was cancelled.
    Failing,
    /// Final verdict produced (approved or not).
    Completed,
    /// No usable result.
    Failed,
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Valid transitions from this phase.
    pub fn valid_transitions(self) -> &'static [RunPhase] {
        match self {
            Self::Pending => &[Self::Classifying, Self::Failing],
            Self::Classifying => &[Self::ExecutingPairs, Self::Failing],
            Self::ExecutingPairs => &[Self::ResolvingConflicts, Self::Finalizing, Self::Failing],
            Self::ResolvingConflicts => &[Self::Finalizing, Self::Failing],
            Self::Finalizing => &[Self::Completed],
            Self::Failing => &[Self::Failed],
            Self::Completed | Self::Failed => &[],
        }
    }

    pub fn can_transition_to(self, to: RunPhase) -> bool {
        self.valid_transitions().contains(&to)
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Classifying => write!(f, "classifying"),
            Self::ExecutingPairs => write!(f, "executing_pairs"),
            Self::ResolvingConflicts => write!(f, "resolving_conflicts"),
            Self::Finalizing => write!(f, "finalizing"),
            Self::Failing => write!(f, "failing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A recorded phase change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: RunPhase,
    pub to: RunPhase,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Error for invalid phase transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub from: RunPhase,
    pub to: RunPhase,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid transition {} → {} (allowed: {:?})",
            self.from,
            self.to,
            self.from.valid_transitions()
        )
    }
}

impl std::error::Error for TransitionError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_is_valid() {
        let path = [
            RunPhase::Pending,
            RunPhase::Classifying,
            RunPhase::ExecutingPairs,
            RunPhase::ResolvingConflicts,
            RunPhase::Finalizing,
            RunPhase::Completed,
        ];
        for w in path.windows(2) {
            assert!(w[0].can_transition_to(w[1]), "{} → {}", w[0], w[1]);
        }
    }

    #[test]
    fn test_finalizing_only_completes() {
        assert_eq!(RunPhase::Finalizing.valid_transitions(), &[RunPhase::Completed]);
        assert!(!RunPhase::Finalizing.can_transition_to(RunPhase::Failing));
    }

    #[test]
    fn test_terminal_phases() {
        assert!(RunPhase::Completed.is_terminal());
        assert!(RunPhase::Failed.is_terminal());
        assert!(RunPhase::Completed.valid_transitions().is_empty());
        assert!(!RunPhase::Failing.is_terminal());
    }

    #[test]
    fn test_no_rerun_after_resolution() {
        assert!(!RunPhase::ResolvingConflicts.can_transition_to(RunPhase::ExecutingPairs));
    }

    #[test]
    fn test_display() {
        assert_eq!(RunPhase::ExecutingPairs.to_string(), "executing_pairs");
        assert_eq!(RunPhase::ResolvingConflicts.to_string(), "resolving_conflicts");
    }
}
