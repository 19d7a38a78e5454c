//! Run controller — the top-level state machine for one task.
//!
//! ```text
//! Pending → Classifying → ExecutingPairs ─┬─▶ ResolvingConflicts ─▶ Finalizing ─▶ Completed
//!                │              │          ├─▶ Finalizing ──────────────────────▶ Completed
//!                └──────────────┴──────────┴─▶ Failing ─────────────────────────▶ Failed
//! ```
//!
//! The controller owns the [`RunState`]. Pairs and the coordinator receive
//! `&RunState` and hand back values that are merged here through
//! [`RunState::apply`], so every write happens on this task.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::phase::RunPhase;
use super::state::{RunState, StateDelta};
use crate::coordinator::{aggregate, ArbitrationPolicy, Coordinator};
use crate::error::CoordinationResult;
use crate::pair::config::PairType;
use crate::pair::engine::PairOutcome;
use crate::pair::registry::PairRegistry;

/// How pairs in the plan are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum ExecutionMode {
    /// One pair at a time in plan order; later pairs see earlier results.
    Sequential,
    /// Up to `max_parallel` pairs at once against the post-classification
    /// snapshot. Results are merged in plan order.
    Concurrent { max_parallel: usize },
}

impl Default for ExecutionMode {
    fn default() -> Self {
        Self::Sequential
    }
}

impl ExecutionMode {
    /// Sequential for 0 or 1, concurrent otherwise.
    pub fn with_parallelism(max_parallel: usize) -> Self {
        if max_parallel <= 1 {
            Self::Sequential
        } else {
            Self::Concurrent { max_parallel }
        }
    }
}

/// Next phase once every planned pair has finished.
///
/// Fails only when REJECTED pairs strictly outnumber APPROVED ones.
pub fn route_after_pairs(state: &RunState) -> RunPhase {
    let failed = state.failed_pairs().len();
    let approved = state.approved_pairs().len();
    if failed > approved {
        RunPhase::Failing
    } else if state.has_open_conflicts() {
        RunPhase::ResolvingConflicts
    } else {
        RunPhase::Finalizing
    }
}

/// Drives a run from classification to a terminal phase.
pub struct RunController {
    registry: Arc<PairRegistry>,
    coordinator: Arc<dyn Coordinator>,
    mode: ExecutionMode,
    /// Rules on a conflict when the coordinator cannot.
    fallback_policy: ArbitrationPolicy,
}

impl RunController {
    pub fn new(registry: Arc<PairRegistry>, coordinator: Arc<dyn Coordinator>) -> Self {
        Self {
            registry,
            coordinator,
            mode: ExecutionMode::Sequential,
            fallback_policy: ArbitrationPolicy::default(),
        }
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_fallback_policy(mut self, policy: ArbitrationPolicy) -> Self {
        self.fallback_policy = policy;
        self
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn registry(&self) -> &PairRegistry {
        &self.registry
    }

    /// Run to completion.
    ///
    /// Returns the terminal state: COMPLETED with a final verdict, or FAILED
    /// without one. `Err` is reserved for configuration problems, such as a
    /// plan naming a pair type that was never registered.
    pub async fn run(
        &self,
        mut state: RunState,
        cancel: &CancellationToken,
    ) -> CoordinationResult<RunState> {
        info!(
            task = %state.task_id,
            coordinator = self.coordinator.id(),
            pairs_registered = self.registry.len(),
            mode = ?self.mode,
            "run started"
        );
        state.transition(RunPhase::Classifying, "run started")?;

        let classified = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            plan = self.coordinator.classify(&state) => Some(plan),
        };
        let Some(classified) = classified else {
            return self.fail(state, "cancelled during classification");
        };
        let mut plan = match classified {
            Ok(plan) => plan,
            Err(e) => {
                error!(task = %state.task_id, error = %e, "classification failed");
                return self.fail(state, &format!("classification failed: {}", e));
            }
        };
        self.registry.ensure_registered(&plan.execution_order)?;
        let planned = plan.execution_order.len();
        let mut seen = BTreeSet::new();
        plan.execution_order.retain(|pair| seen.insert(pair.clone()));
        if plan.execution_order.len() < planned {
            warn!(
                task = %state.task_id,
                dropped = planned - plan.execution_order.len(),
                "plan lists a pair type more than once; keeping first occurrence"
            );
        }
        let order = plan.execution_order.clone();
        info!(
            task = %state.task_id,
            order = ?order.iter().map(PairType::as_str).collect::<Vec<_>>(),
            complexity = %plan.complexity,
            "plan set"
        );
        state.apply(StateDelta::Plan(plan))?;
        state.transition(RunPhase::ExecutingPairs, "plan set")?;

        match self.mode {
            ExecutionMode::Sequential => {
                self.execute_sequential(&mut state, &order, cancel).await?
            }
            ExecutionMode::Concurrent { max_parallel } => {
                self.execute_concurrent(&mut state, &order, max_parallel, cancel)
                    .await?
            }
        }

        if cancel.is_cancelled() {
            return self.fail(state, "cancelled during pair execution");
        }

        match route_after_pairs(&state) {
            RunPhase::Failing => {
                let reason = format!(
                    "{} pairs rejected against {} approved",
                    state.failed_pairs().len(),
                    state.approved_pairs().len()
                );
                return self.fail(state, &reason);
            }
            RunPhase::ResolvingConflicts => {
                state.transition(RunPhase::ResolvingConflicts, "open conflicts")?;
                if let Err(reason) = self.resolve_conflicts(&mut state, cancel).await {
                    return self.fail(state, &reason);
                }
                state.transition(RunPhase::Finalizing, "conflicts resolved")?;
            }
            _ => state.transition(RunPhase::Finalizing, "all pairs settled")?,
        }

        let verdict = match self.coordinator.finalize(&state).await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(
                    task = %state.task_id,
                    error = %e,
                    "finalize failed; aggregating results directly"
                );
                aggregate(&state)
            }
        };
        info!(
            task = %state.task_id,
            approved = verdict.approved,
            quality = verdict.quality_score,
            conflicts_resolved = verdict.conflicts_resolved,
            "final verdict"
        );
        state.apply(StateDelta::Verdict(verdict))?;
        state.transition(RunPhase::Completed, "verdict rendered")?;
        info!("{}", state.summary_line());
        Ok(state)
    }

    async fn execute_sequential(
        &self,
        state: &mut RunState,
        order: &[PairType],
        cancel: &CancellationToken,
    ) -> CoordinationResult<()> {
        for (position, pair) in order.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(
                    task = %state.task_id,
                    skipped = order.len() - position,
                    "cancelled; skipping remaining pairs"
                );
                break;
            }
            let outcome = self.registry.execute(pair, state, cancel).await?;
            self.merge(state, outcome)?;
        }
        Ok(())
    }

    async fn execute_concurrent(
        &self,
        state: &mut RunState,
        order: &[PairType],
        max_parallel: usize,
        cancel: &CancellationToken,
    ) -> CoordinationResult<()> {
        let snapshot: &RunState = state;
        let registry = &self.registry;
        // `buffered` yields in input order, which keeps the merge deterministic.
        let outcomes: Vec<Option<CoordinationResult<PairOutcome>>> = stream::iter(order)
            .map(|pair| async move {
                if cancel.is_cancelled() {
                    None
                } else {
                    Some(registry.execute(pair, snapshot, cancel).await)
                }
            })
            .buffered(max_parallel.max(1))
            .collect()
            .await;

        let skipped = outcomes.iter().filter(|o| o.is_none()).count();
        if skipped > 0 {
            warn!(task = %state.task_id, skipped, "cancelled; pairs not started");
        }
        for outcome in outcomes.into_iter().flatten() {
            self.merge(state, outcome?)?;
        }
        Ok(())
    }

    fn merge(&self, state: &mut RunState, outcome: PairOutcome) -> CoordinationResult<()> {
        info!(task = %state.task_id, "{}", outcome.run.status_line());
        state.apply(StateDelta::PairFinished(outcome))
    }

    /// Rule on every open conflict, using the fallback policy when the
    /// coordinator fails. `Err` carries the failure reason (cancellation).
    async fn resolve_conflicts(
        &self,
        state: &mut RunState,
        cancel: &CancellationToken,
    ) -> Result<(), String> {
        let open: Vec<_> = state.open_conflicts().cloned().collect();
        for conflict in open {
            if cancel.is_cancelled() {
                return Err("cancelled during conflict resolution".to_string());
            }
            let ruling = match self.coordinator.resolve_conflict(state, &conflict).await {
                Ok(ruling) => ruling,
                Err(e) => {
                    warn!(
                        task = %state.task_id,
                        pair = %conflict.pair_type,
                        conflict = %conflict.id,
                        error = %e,
                        "coordinator ruling failed; applying fallback policy"
                    );
                    self.fallback_policy.rule_on(&conflict)
                }
            };
            info!(
                task = %state.task_id,
                pair = %conflict.pair_type,
                conflict = %conflict.id,
                ruling = %ruling.decision,
                instruction = %ruling.binding_instruction,
                "conflict resolved"
            );
            state
                .apply(StateDelta::ConflictResolved {
                    conflict_id: conflict.id.clone(),
                    ruling,
                })
                .map_err(|e| e.to_string())?;
        }
        Ok(())
    }

    /// Move through Failing to Failed. No verdict is produced.
    fn fail(&self, mut state: RunState, reason: &str) -> CoordinationResult<RunState> {
        warn!(task = %state.task_id, phase = %state.phase(), reason, "run failing");
        state.transition(RunPhase::Failing, reason)?;
        state.transition(RunPhase::Failed, "no usable result")?;
        info!("{}", state.summary_line());
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pair::engine::PairOutcome;
    use crate::pair::run::{PairRun, PairStatus};

    fn with_runs(statuses: &[(&str, PairStatus)]) -> RunState {
        let mut state = RunState::new("t", "x");
        for (pair, status) in statuses {
            let mut run = PairRun::new((*pair).into());
            run.begin();
            run.finish(*status, "test");
            state
                .apply(StateDelta::PairFinished(PairOutcome { run, conflict: None }))
                .unwrap();
        }
        state
    }

    #[test]
    fn test_route_boundary_uses_strict_greater() {
        let state = with_runs(&[
            ("a", PairStatus::Approved),
            ("b", PairStatus::Approved),
            ("c", PairStatus::Rejected),
        ]);
        assert_eq!(route_after_pairs(&state), RunPhase::Finalizing);

        let state = with_runs(&[("a", PairStatus::Approved), ("c", PairStatus::Rejected)]);
        assert_eq!(route_after_pairs(&state), RunPhase::Finalizing);

        let state = with_runs(&[
            ("a", PairStatus::Approved),
            ("b", PairStatus::Rejected),
            ("c", PairStatus::Rejected),
        ]);
        assert_eq!(route_after_pairs(&state), RunPhase::Failing);
    }

    #[test]
    fn test_escalated_pairs_do_not_count_as_failed() {
        let state = with_runs(&[("a", PairStatus::Escalated), ("b", PairStatus::Escalated)]);
        assert_eq!(route_after_pairs(&state), RunPhase::Finalizing);
    }

    #[test]
    fn test_execution_mode_from_parallelism() {
        assert_eq!(ExecutionMode::with_parallelism(0), ExecutionMode::Sequential);
        assert_eq!(ExecutionMode::with_parallelism(1), ExecutionMode::Sequential);
        assert_eq!(
            ExecutionMode::with_parallelism(4),
            ExecutionMode::Concurrent { max_parallel: 4 }
        );
    }
}
