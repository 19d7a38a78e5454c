//! Rule-based arbitration of escalated conflicts.
//!
//! Rulings are derived from the score snapshot the conflict carries:
//!
//! - **APPROVE_REVIEWER**: some dimension sits at least `hard_floor_margin`
//!   below the floor, or a strict pair (security by default) is below it
//!   at all.
//! - **APPROVE_PROPOSER**: the floor holds and the average is within
//!   `near_miss_margin` of the approval threshold.
//! - **COMPROMISE**: everything else. The proposal stands on condition the
//!   reviewer's must-address items are handled.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::pair::config::PairType;
use crate::run::state::{Conflict, Ruling, RulingDecision};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrationPolicy {
    pub near_miss_margin: f64,
    pub hard_floor_margin: f64,
    /// Pairs where any dimension below the floor upholds the reviewer.
    pub strict_pairs: Vec<PairType>,
}

impl Default for ArbitrationPolicy {
    fn default() -> Self {
        Self {
            near_miss_margin: 1.0,
            hard_floor_margin: 2.0,
            strict_pairs: vec![PairType::new("security")],
        }
    }
}

/// Must-address items recorded in the conflict snapshot.
pub fn must_address(conflict: &Conflict) -> Vec<String> {
    conflict
        .context
        .get("must_address")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn reviewer_items(conflict: &Conflict) -> String {
    let items = must_address(conflict);
    if !items.is_empty() {
        items.join("; ")
    } else if !conflict.reviewer_position.trim().is_empty() {
        conflict.reviewer_position.clone()
    } else {
        "the reviewer's outstanding concerns".to_string()
    }
}

impl ArbitrationPolicy {
    fn is_strict(&self, pair_type: &PairType) -> bool {
        self.strict_pairs.contains(pair_type)
    }

    /// Decide a conflict from its snapshot.
    pub fn rule_on(&self, conflict: &Conflict) -> Ruling {
        let pair = &conflict.pair_type;
        let iteration = conflict.iterations_attempted;

        let (Some(average), Some(floor), Some(approval), Some(minimum)) = (
            conflict.context_f64("last_average"),
            conflict.context_f64("last_floor"),
            conflict.context_f64("approval_threshold"),
            conflict.context_f64("min_score_threshold"),
        ) else {
            return Ruling::new(
                RulingDecision::Compromise,
                format!("{} conflict carries no score snapshot", pair),
                format!(
                    "Adopt the {} proposal only after addressing: {}",
                    pair,
                    reviewer_items(conflict)
                ),
            );
        };

        if floor < minimum - self.hard_floor_margin || (self.is_strict(pair) && floor < minimum) {
            return Ruling::new(
                RulingDecision::ApproveReviewer,
                format!(
                    "lowest dimension {:.1} is below the {:.1} floor for {}",
                    floor, minimum, pair
                ),
                format!(
                    "Do not adopt the {} proposal; revise it to address: {}",
                    pair,
                    reviewer_items(conflict)
                ),
            );
        }

        if floor >= minimum && average >= approval - self.near_miss_margin {
            return Ruling::new(
                RulingDecision::ApproveProposer,
                format!(
                    "average {:.2} is within {:.1} of the {:.1} threshold and no dimension is below the floor",
                    average, self.near_miss_margin, approval
                ),
                format!("Adopt the {} proposal from iteration {} as final", pair, iteration),
            );
        }

        Ruling::new(
            RulingDecision::Compromise,
            format!(
                "average {:.2} against threshold {:.1}, lowest dimension {:.1} against floor {:.1}",
                average, approval, floor, minimum
            ),
            format!(
                "Adopt the {} proposal from iteration {} on condition that it addresses: {}",
                pair,
                iteration,
                reviewer_items(conflict)
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::{json, Map};

    fn conflict(pair: &str, average: f64, floor: f64) -> Conflict {
        let mut context = Map::new();
        context.insert("approval_threshold".into(), json!(7.0));
        context.insert("min_score_threshold".into(), json!(5.0));
        context.insert("last_average".into(), json!(average));
        context.insert("last_floor".into(), json!(floor));
        context.insert("must_address".into(), json!(["add index on user_id"]));
        Conflict {
            id: "conflict-1".into(),
            pair_type: PairType::new(pair),
            proposer_position: "denormalise for speed".into(),
            reviewer_position: "missing index".into(),
            iterations_attempted: 3,
            context,
            resolved: false,
            ruling: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_near_miss_approves_proposer() {
        let ruling = ArbitrationPolicy::default().rule_on(&conflict("database", 6.4, 5.5));
        assert_eq!(ruling.decision, RulingDecision::ApproveProposer);
        assert!(ruling.binding_instruction.contains("iteration 3"));
    }

    #[test]
    fn test_hard_floor_breach_approves_reviewer() {
        let ruling = ArbitrationPolicy::default().rule_on(&conflict("database", 6.8, 2.5));
        assert_eq!(ruling.decision, RulingDecision::ApproveReviewer);
        assert!(ruling.binding_instruction.contains("add index on user_id"));
    }

    #[test]
    fn test_strict_pair_below_floor_approves_reviewer() {
        let ruling = ArbitrationPolicy::default().rule_on(&conflict("security", 6.8, 4.5));
        assert_eq!(ruling.decision, RulingDecision::ApproveReviewer);
        let ruling = ArbitrationPolicy::default().rule_on(&conflict("database", 6.8, 4.5));
        assert_eq!(ruling.decision, RulingDecision::Compromise);
    }

    #[test]
    fn test_far_miss_is_compromise() {
        let ruling = ArbitrationPolicy::default().rule_on(&conflict("backend", 5.2, 5.0));
        assert_eq!(ruling.decision, RulingDecision::Compromise);
        assert!(ruling.binding_instruction.contains("on condition"));
    }

    #[test]
    fn test_missing_snapshot_is_compromise() {
        let mut c = conflict("backend", 0.0, 0.0);
        c.context.clear();
        let ruling = ArbitrationPolicy::default().rule_on(&c);
        assert_eq!(ruling.decision, RulingDecision::Compromise);
        assert!(ruling.binding_instruction.contains("missing index"));
    }
}
