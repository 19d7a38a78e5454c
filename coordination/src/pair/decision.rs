//! The approval/escalation predicate.
//!
//! Pure and independent of any proposer or reviewer so it can be tested on
//! its own.

use serde::{Deserialize, Serialize};

use super::config::PairConfig;
use super::evaluation::ReviewEvaluation;

/// What the pair engine does after an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairDecision {
    /// Approval rule satisfied; stop with APPROVED.
    Approve,
    /// Not approved with budget left. Feedback goes to the next iteration.
    Continue,
    /// Not approved and this was the last allowed iteration.
    Escalate,
}

impl std::fmt::Display for PairDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Approve => write!(f, "approve"),
            Self::Continue => write!(f, "continue"),
            Self::Escalate => write!(f, "escalate"),
        }
    }
}

/// `average >= approval_threshold AND floor >= min_score_threshold`.
pub fn meets_approval_rule(evaluation: &ReviewEvaluation, config: &PairConfig) -> bool {
    evaluation.average() >= config.approval_threshold
        && evaluation.floor() >= config.min_score_threshold
}

/// Decide the next step for `iteration` (1-indexed).
pub fn decide(evaluation: &ReviewEvaluation, config: &PairConfig, iteration: u32) -> PairDecision {
    if meets_approval_rule(evaluation, config) {
        PairDecision::Approve
    } else if iteration >= config.max_iterations {
        PairDecision::Escalate
    } else {
        PairDecision::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pair::evaluation::DimensionScores;

    fn config() -> PairConfig {
        PairConfig::new("backend", "dev", "critic")
            .with_thresholds(7.0, 5.0)
            .with_max_iterations(3)
    }

    fn eval(scores: DimensionScores) -> ReviewEvaluation {
        ReviewEvaluation::new(scores, "")
    }

    #[test]
    fn test_approve_when_both_thresholds_met() {
        let e = eval(DimensionScores::new(8.0, 7.0, 7.5, 7.5, 6.0));
        assert_eq!(decide(&e, &config(), 1), PairDecision::Approve);
    }

    #[test]
    fn test_exact_thresholds_approve() {
        let e = eval(DimensionScores::new(9.0, 9.0, 7.0, 5.0, 5.0));
        assert!((e.average() - 7.0).abs() < 1e-9);
        assert_eq!(decide(&e, &config(), 2), PairDecision::Approve);
    }

    #[test]
    fn test_high_average_low_floor_continues() {
        // average 8.0 but one dimension below the floor
        let e = eval(DimensionScores::new(10.0, 10.0, 10.0, 10.0, 0.0));
        assert_eq!(decide(&e, &config(), 1), PairDecision::Continue);
    }

    #[test]
    fn test_low_average_continues_then_escalates() {
        let e = eval(DimensionScores::uniform(6.0));
        assert_eq!(decide(&e, &config(), 1), PairDecision::Continue);
        assert_eq!(decide(&e, &config(), 2), PairDecision::Continue);
        assert_eq!(decide(&e, &config(), 3), PairDecision::Escalate);
    }

    #[test]
    fn test_approval_wins_on_last_iteration() {
        let e = eval(DimensionScores::uniform(9.0));
        assert_eq!(decide(&e, &config(), 3), PairDecision::Approve);
    }

    #[test]
    fn test_single_iteration_budget() {
        let cfg = config().with_max_iterations(1);
        let e = eval(DimensionScores::uniform(5.0));
        assert_eq!(decide(&e, &cfg, 1), PairDecision::Escalate);
    }

    #[test]
    fn test_thresholds_are_pair_specific() {
        let strict = PairConfig::new("security", "sec", "auditor").with_thresholds(8.0, 7.0);
        let e = eval(DimensionScores::uniform(7.5));
        assert!(meets_approval_rule(&e, &config()));
        assert!(!meets_approval_rule(&e, &strict));
    }
}
