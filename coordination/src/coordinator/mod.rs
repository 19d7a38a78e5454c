//! Coordinator — classifies tasks, arbitrates conflicts, renders the verdict.
//!
//! The coordinator is a role behind a trait so a generative implementation
//! can replace the rule-based one. Every method takes `&RunState` and
//! returns a value for the run controller to merge.

pub mod arbitration;
pub mod classifier;
pub mod verdict;

use async_trait::async_trait;
use tracing::debug;

use crate::error::CoordinationResult;
use crate::pair::config::PairType;
use crate::run::state::{Conflict, FinalVerdict, RunPlan, RunState, Ruling};

pub use arbitration::ArbitrationPolicy;
pub use classifier::{
    default_profiles, extract_constraints, summarize, PairProfile, TaskClassifier,
};
pub use verdict::{aggregate, quality_score};

/// Authoritative role of a run.
#[async_trait]
pub trait Coordinator: Send + Sync {
    /// Coordinator identifier (for logs).
    fn id(&self) -> &str;

    /// Classify the request into a plan.
    async fn classify(&self, state: &RunState) -> CoordinationResult<RunPlan>;

    /// Produce a binding ruling for an escalated conflict.
    async fn resolve_conflict(&self, state: &RunState, conflict: &Conflict)
        -> CoordinationResult<Ruling>;

    /// Render the final verdict. Defaults to the deterministic aggregate.
    async fn finalize(&self, state: &RunState) -> CoordinationResult<FinalVerdict> {
        Ok(aggregate(state))
    }
}

/// Deterministic coordinator: signal classifier plus score-based arbitration.
#[derive(Debug, Clone, Default)]
pub struct RuleCoordinator {
    classifier: TaskClassifier,
    policy: ArbitrationPolicy,
}

impl RuleCoordinator {
    pub fn new(classifier: TaskClassifier, policy: ArbitrationPolicy) -> Self {
        Self { classifier, policy }
    }

    /// Rule coordinator whose catalogue only covers `available` pair types.
    pub fn for_pairs<'a>(available: impl IntoIterator<Item = &'a PairType>) -> Self {
        Self::new(
            TaskClassifier::default().restricted_to(available),
            ArbitrationPolicy::default(),
        )
    }

    pub fn classifier(&self) -> &TaskClassifier {
        &self.classifier
    }

    pub fn policy(&self) -> &ArbitrationPolicy {
        &self.policy
    }
}

#[async_trait]
impl Coordinator for RuleCoordinator {
    fn id(&self) -> &str {
        "rule-coordinator"
    }

    async fn classify(&self, state: &RunState) -> CoordinationResult<RunPlan> {
        let plan = self.classifier.classify(&state.original_request);
        debug!(
            task = %state.task_id,
            pairs = plan.execution_order.len(),
            complexity = %plan.complexity,
            "task classified"
        );
        Ok(plan)
    }

    async fn resolve_conflict(
        &self,
        _state: &RunState,
        conflict: &Conflict,
    ) -> CoordinationResult<Ruling> {
        Ok(self.policy.rule_on(conflict))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rule_coordinator_classify() {
        let coordinator = RuleCoordinator::default();
        let state = RunState::new("t", "Add a login endpoint");
        let plan = coordinator.classify(&state).await.unwrap();
        let names: Vec<&str> = plan.execution_order.iter().map(PairType::as_str).collect();
        assert_eq!(names, vec!["backend", "security", "qa"]);
    }

    #[tokio::test]
    async fn test_default_finalize_aggregates() {
        let coordinator = RuleCoordinator::default();
        let state = RunState::new("t", "x");
        let verdict = coordinator.finalize(&state).await.unwrap();
        assert!(!verdict.approved);
        assert_eq!(verdict.quality_score, 0.0);
    }
}
