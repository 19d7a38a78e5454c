//! Run state — the single aggregate for one task run.
//!
//! Components never mutate `RunState` directly. They receive `&RunState`
//! and return a [`StateDelta`] which the run controller merges with
//! [`RunState::apply`]. The plan can be set once and is only reachable
//! through a shared reference afterwards.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::warn;
use uuid::Uuid;

use crate::error::{CoordinationError, CoordinationResult};
use crate::pair::config::{PairConfig, PairType};
use crate::pair::engine::PairOutcome;
use crate::pair::run::{PairRun, PairStatus};

use super::phase::{PhaseTransition, RunPhase, TransitionError};

/// Complexity estimate from classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Low,
    Medium,
    High,
    Critical,
}

impl Complexity {
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "low" | "simple" | "trivial" => Some(Self::Low),
            "medium" | "moderate" => Some(Self::Medium),
            "high" | "complex" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// The coordinator's classification of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunPlan {
    pub task_summary: String,
    /// Selected pair types in execution order.
    pub execution_order: Vec<PairType>,
    pub success_criteria: Vec<String>,
    pub constraints: Vec<String>,
    pub complexity: Complexity,
}

impl RunPlan {
    pub fn includes(&self, pair_type: &PairType) -> bool {
        self.execution_order.contains(pair_type)
    }
}

/// Coordinator ruling on an escalated conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RulingDecision {
    /// Proposer's final position stands.
    ApproveProposer,
    /// Reviewer's objections are upheld.
    ApproveReviewer,
    /// Proposer's position stands with binding conditions.
    Compromise,
}

impl RulingDecision {
    pub fn parse(label: &str) -> Option<Self> {
        let normalized = label.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "approve_proposer" | "proposer" => Some(Self::ApproveProposer),
            "approve_reviewer" | "reviewer" => Some(Self::ApproveReviewer),
            "compromise" => Some(Self::Compromise),
            _ => None,
        }
    }
}

impl std::fmt::Display for RulingDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApproveProposer => write!(f, "APPROVE_PROPOSER"),
            Self::ApproveReviewer => write!(f, "APPROVE_REVIEWER"),
            Self::Compromise => write!(f, "COMPROMISE"),
        }
    }
}

/// A binding ruling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ruling {
    pub decision: RulingDecision,
    pub rationale: String,
    /// Instruction every downstream consumer must follow.
    pub binding_instruction: String,
    pub ruled_at: DateTime<Utc>,
}

impl Ruling {
    pub fn new(
        decision: RulingDecision,
        rationale: impl Into<String>,
        binding_instruction: impl Into<String>,
    ) -> Self {
        Self {
            decision,
            rationale: rationale.into(),
            binding_instruction: binding_instruction.into(),
            ruled_at: Utc::now(),
        }
    }
}

/// Disagreement left behind by an escalated pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub id: String,
    pub pair_type: PairType,
    /// Proposer's last rationale.
    pub proposer_position: String,
    /// Reviewer's last feedback.
    pub reviewer_position: String,
    pub iterations_attempted: u32,
    /// Snapshot of the last scores and the pair's thresholds.
    pub context: Map<String, Value>,
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ruling: Option<Ruling>,
    pub created_at: DateTime<Utc>,
}

impl Conflict {
    /// Build the conflict for an escalated pair run.
    pub fn from_escalation(run: &PairRun, config: &PairConfig) -> Self {
        let mut context = Map::new();
        context.insert("approval_threshold".into(), json!(config.approval_threshold));
        context.insert("min_score_threshold".into(), json!(config.min_score_threshold));
        context.insert("max_iterations".into(), json!(config.max_iterations));

        let (proposer_position, reviewer_position) = match run.last_iteration() {
            Some(last) => {
                let evaluation = &last.verdict.evaluation;
                let scores: Map<String, Value> = evaluation
                    .scores
                    .iter()
                    .map(|(d, s)| (d.to_string(), json!(s)))
                    .collect();
                context.insert("last_scores".into(), Value::Object(scores));
                context.insert("last_average".into(), json!(evaluation.average()));
                context.insert("last_floor".into(), json!(evaluation.floor()));
                context.insert("last_decision".into(), json!(last.verdict.decision));
                context.insert("must_address".into(), json!(last.verdict.must_address));

                let reviewer = if evaluation.feedback.trim().is_empty() {
                    last.verdict.must_address.join("; ")
                } else {
                    evaluation.feedback.clone()
                };
                (last.output.rationale.clone(), reviewer)
            }
            None => (String::new(), String::new()),
        };

        Self {
            id: format!("conflict-{}", Uuid::new_v4()),
            pair_type: run.pair_type.clone(),
            proposer_position,
            reviewer_position,
            iterations_attempted: run.iterations.len() as u32,
            context,
            resolved: false,
            ruling: None,
            created_at: Utc::now(),
        }
    }

    /// Mark resolved with `ruling`. Resolving twice is a no-op that keeps
    /// the original ruling.
    pub fn resolve(&mut self, ruling: Ruling) -> &Ruling {
        self.resolved = true;
        self.ruling.get_or_insert(ruling)
    }

    /// Numeric value from the context snapshot.
    pub fn context_f64(&self, key: &str) -> Option<f64> {
        self.context.get(key).and_then(Value::as_f64)
    }

    /// Last score recorded for `dimension`.
    pub fn last_score(&self, dimension: &str) -> Option<f64> {
        self.context
            .get("last_scores")
            .and_then(|s| s.get(dimension))
            .and_then(Value::as_f64)
    }
}

/// The run's single binding outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalVerdict {
    pub approved: bool,
    pub rationale: String,
    /// Mean of every pair's final average, in `[0, 10]`.
    pub quality_score: f64,
    pub all_pairs_passed: bool,
    pub conflicts_resolved: usize,
    pub conditions: Vec<String>,
    pub next_steps: Vec<String>,
    pub artifacts_to_commit: Vec<String>,
}

/// Overall status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl From<RunPhase> for RunStatus {
    fn from(phase: RunPhase) -> Self {
        match phase {
            RunPhase::Pending => Self::Pending,
            RunPhase::Completed => Self::Completed,
            RunPhase::Failed => Self::Failed,
            _ => Self::InProgress,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A change returned by a component for the controller to merge.
#[derive(Debug, Clone)]
pub enum StateDelta {
    Plan(RunPlan),
    PairFinished(PairOutcome),
    ConflictResolved { conflict_id: String, ruling: Ruling },
    Verdict(FinalVerdict),
}

/// Aggregate state of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub task_id: String,
    pub original_request: String,
    plan: Option<RunPlan>,
    pair_results: BTreeMap<PairType, PairRun>,
    conflicts: Vec<Conflict>,
    final_verdict: Option<FinalVerdict>,
    status: RunStatus,
    phase: RunPhase,
    transitions: Vec<PhaseTransition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RunState {
    pub fn new(task_id: impl Into<String>, original_request: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            original_request: original_request.into(),
            plan: None,
            pair_results: BTreeMap::new(),
            conflicts: Vec::new(),
            final_verdict: None,
            status: RunStatus::Pending,
            phase: RunPhase::Pending,
            transitions: Vec::new(),
            failure_reason: None,
            created_at: Utc::now(),
        }
    }

    pub fn plan(&self) -> Option<&RunPlan> {
        self.plan.as_ref()
    }

    pub fn pair_results(&self) -> &BTreeMap<PairType, PairRun> {
        &self.pair_results
    }

    pub fn pair_result(&self, pair_type: &PairType) -> Option<&PairRun> {
        self.pair_results.get(pair_type)
    }

    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }

    pub fn final_verdict(&self) -> Option<&FinalVerdict> {
        self.final_verdict.as_ref()
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn transitions(&self) -> &[PhaseTransition] {
        &self.transitions
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Set the plan. Fails if one is already set.
    pub fn set_plan(&mut self, plan: RunPlan) -> CoordinationResult<()> {
        if self.plan.is_some() {
            return Err(CoordinationError::PlanAlreadySet);
        }
        self.plan = Some(plan);
        Ok(())
    }

    /// Merge a component's delta.
    pub fn apply(&mut self, delta: StateDelta) -> CoordinationResult<()> {
        match delta {
            StateDelta::Plan(plan) => self.set_plan(plan),
            StateDelta::PairFinished(outcome) => {
                let PairOutcome { run, conflict } = outcome;
                if self.pair_results.contains_key(&run.pair_type) {
                    warn!(pair = %run.pair_type, "pair result replaced");
                }
                self.pair_results.insert(run.pair_type.clone(), run);
                if let Some(conflict) = conflict {
                    self.conflicts.push(conflict);
                }
                Ok(())
            }
            StateDelta::ConflictResolved { conflict_id, ruling } => {
                self.resolve_conflict(&conflict_id, ruling).map(|_| ())
            }
            StateDelta::Verdict(verdict) => {
                self.final_verdict = Some(verdict);
                Ok(())
            }
        }
    }

    /// Resolve a conflict by id; returns the ruling in force (the original
    /// one if the conflict was already resolved).
    pub fn resolve_conflict(
        &mut self,
        conflict_id: &str,
        ruling: Ruling,
    ) -> CoordinationResult<&Ruling> {
        let conflict = self
            .conflicts
            .iter_mut()
            .find(|c| c.id == conflict_id)
            .ok_or_else(|| CoordinationError::ConflictNotFound(conflict_id.to_string()))?;
        Ok(conflict.resolve(ruling))
    }

    /// Move to a new phase, recording the transition.
    pub fn transition(&mut self, to: RunPhase, reason: &str) -> Result<(), TransitionError> {
        if !self.phase.can_transition_to(to) {
            return Err(TransitionError {
                from: self.phase,
                to,
            });
        }
        self.transitions.push(PhaseTransition {
            from: self.phase,
            to,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        self.phase = to;
        self.status = RunStatus::from(to);
        if to == RunPhase::Failing && self.failure_reason.is_none() {
            self.failure_reason = Some(reason.to_string());
        }
        Ok(())
    }

    fn pairs_with(&self, status: PairStatus) -> Vec<&PairType> {
        self.pair_results
            .values()
            .filter(|r| r.status == status)
            .map(|r| &r.pair_type)
            .collect()
    }

    pub fn approved_pairs(&self) -> Vec<&PairType> {
        self.pairs_with(PairStatus::Approved)
    }

    /// Pairs that ended REJECTED.
    pub fn failed_pairs(&self) -> Vec<&PairType> {
        self.pairs_with(PairStatus::Rejected)
    }

    pub fn escalated_pairs(&self) -> Vec<&PairType> {
        self.pairs_with(PairStatus::Escalated)
    }

    pub fn open_conflicts(&self) -> impl Iterator<Item = &Conflict> {
        self.conflicts.iter().filter(|c| !c.resolved)
    }

    pub fn has_open_conflicts(&self) -> bool {
        self.open_conflicts().next().is_some()
    }

    pub fn resolved_conflict_count(&self) -> usize {
        self.conflicts.iter().filter(|c| c.resolved).count()
    }

    /// Compact status line.
    pub fn summary_line(&self) -> String {
        format!(
            "[{}] task={} | pairs {} ({} approved, {} rejected, {} escalated) | conflicts {}/{} resolved",
            self.phase,
            self.task_id,
            self.pair_results.len(),
            self.approved_pairs().len(),
            self.failed_pairs().len(),
            self.escalated_pairs().len(),
            self.resolved_conflict_count(),
            self.conflicts.len()
        )
    }
}
