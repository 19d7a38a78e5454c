//! Per-pair run records — proposals, iterations, and terminal status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::config::PairType;
use super::evaluation::{ReviewEvaluation, ReviewVerdict};

/// A proposer's output for one iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalOutput {
    /// Iteration this output belongs to (1-indexed).
    pub iteration: u32,
    /// Opaque structured content.
    pub content: Map<String, Value>,
    /// Why the proposer chose this solution.
    pub rationale: String,
    /// What changed since the previous iteration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_from_previous: Option<String>,
}

impl ProposalOutput {
    pub fn new(iteration: u32, rationale: impl Into<String>) -> Self {
        Self {
            iteration,
            content: Map::new(),
            rationale: rationale.into(),
            diff_from_previous: None,
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.content.insert(key.into(), value.into());
        self
    }

    pub fn with_diff(mut self, diff: impl Into<String>) -> Self {
        self.diff_from_previous = Some(diff.into());
        self
    }
}

/// Lifecycle status of a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PairStatus {
    Pending,
    InProgress,
    Approved,
    /// Proposer failure or cancellation.
    Rejected,
    /// Iteration budget exhausted without approval.
    Escalated,
}

impl PairStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Escalated)
    }
}

impl std::fmt::Display for PairStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
            Self::Escalated => write!(f, "escalated"),
        }
    }
}

/// One proposal/review exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub output: ProposalOutput,
    pub verdict: ReviewVerdict,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl IterationRecord {
    pub fn iteration(&self) -> u32 {
        self.output.iteration
    }
}

/// The history and outcome of one pair within a run.
///
/// Only the owning pair engine mutates it; it is terminal once status
/// leaves `InProgress`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairRun {
    pub pair_type: PairType,
    pub status: PairStatus,
    pub iterations: Vec<IterationRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_output: Option<ProposalOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_evaluation: Option<ReviewEvaluation>,
    /// Why the pair stopped, for the audit trail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl PairRun {
    pub fn new(pair_type: PairType) -> Self {
        Self {
            pair_type,
            status: PairStatus::Pending,
            iterations: Vec::new(),
            final_output: None,
            final_evaluation: None,
            termination_reason: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// PENDING → IN_PROGRESS.
    pub fn begin(&mut self) {
        if self.status == PairStatus::Pending {
            self.status = PairStatus::InProgress;
            self.started_at = Some(Utc::now());
        }
    }

    pub fn record(&mut self, record: IterationRecord) {
        self.iterations.push(record);
    }

    /// Move to a terminal status. The last recorded iteration (if any)
    /// becomes the final output/evaluation. No-op once terminal.
    pub fn finish(&mut self, status: PairStatus, reason: impl Into<String>) {
        if self.status.is_terminal() || !status.is_terminal() {
            return;
        }
        if let Some(last) = self.iterations.last() {
            self.final_output = Some(last.output.clone());
            self.final_evaluation = Some(last.verdict.evaluation.clone());
        }
        self.status = status;
        self.termination_reason = Some(reason.into());
        self.finished_at = Some(Utc::now());
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn last_iteration(&self) -> Option<&IterationRecord> {
        self.iterations.last()
    }

    pub fn duration_ms(&self) -> Option<u64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds().max(0) as u64),
            _ => None,
        }
    }

    /// Compact status line.
    pub fn status_line(&self) -> String {
        let score = self
            .final_evaluation
            .as_ref()
            .map(|e| format!("{:.2}", e.average()))
            .unwrap_or_else(|| "-".to_string());
        format!(
            "[{}] {} | {} iterations | avg={}",
            self.status,
            self.pair_type,
            self.iterations.len(),
            score
        )
    }
}
