//! Logging setup and per-run metrics.
//!
//! Logs go to stderr so stdout stays machine-readable. `RunMetrics` is a
//! compact digest of a terminal run, logged at the end and optionally
//! appended to a JSONL file.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use pair_coordination::{PairStatus, RunState, RunStatus};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Install the global `fmt` subscriber (`RUST_LOG` overrides `info`).
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairMetrics {
    pub pair_type: String,
    pub status: PairStatus,
    pub iterations: usize,
    pub final_average: Option<f64>,
    pub duration_ms: Option<u64>,
    /// Iterations whose review was a substituted neutral verdict.
    pub fallback_reviews: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetrics {
    pub task_id: String,
    pub status: RunStatus,
    pub pairs: Vec<PairMetrics>,
    pub conflicts: usize,
    pub conflicts_resolved: usize,
    pub approved: Option<bool>,
    pub quality_score: Option<f64>,
    pub failure_reason: Option<String>,
}

impl RunMetrics {
    pub fn from_state(state: &RunState) -> Self {
        let pairs = state
            .pair_results()
            .values()
            .map(|run| PairMetrics {
                pair_type: run.pair_type.to_string(),
                status: run.status,
                iterations: run.iterations.len(),
                final_average: run.final_evaluation.as_ref().map(|e| e.average()),
                duration_ms: run.duration_ms(),
                fallback_reviews: run.iterations.iter().filter(|i| i.verdict.is_fallback()).count(),
            })
            .collect();
        Self {
            task_id: state.task_id.clone(),
            status: state.status(),
            pairs,
            conflicts: state.conflicts().len(),
            conflicts_resolved: state.resolved_conflict_count(),
            approved: state.final_verdict().map(|v| v.approved),
            quality_score: state.final_verdict().map(|v| v.quality_score),
            failure_reason: state.failure_reason().map(str::to_string),
        }
    }

    pub fn log(&self) {
        for pair in &self.pairs {
            info!(
                pair = %pair.pair_type,
                status = %pair.status,
                iterations = pair.iterations,
                final_average = ?pair.final_average,
                fallback_reviews = pair.fallback_reviews,
                "pair metrics"
            );
        }
        info!(
            task = %self.task_id,
            status = %self.status,
            conflicts = self.conflicts,
            conflicts_resolved = self.conflicts_resolved,
            approved = ?self.approved,
            quality = ?self.quality_score,
            "run metrics"
        );
    }

    /// Append as one JSON line.
    pub fn append_jsonl(&self, path: &Path) -> Result<()> {
        let line = serde_json::to_string(self).context("Failed to serialize run metrics")?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        writeln!(file, "{}", line).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_for_fresh_state() {
        let state = RunState::new("t-1", "x");
        let metrics = RunMetrics::from_state(&state);
        assert_eq!(metrics.task_id, "t-1");
        assert_eq!(metrics.status, RunStatus::Pending);
        assert!(metrics.pairs.is_empty());
        assert!(metrics.approved.is_none());
    }

    #[test]
    fn test_append_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.jsonl");
        let metrics = RunMetrics::from_state(&RunState::new("t-2", "x"));
        metrics.append_jsonl(&path).unwrap();
        metrics.append_jsonl(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
        let back: RunMetrics = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert_eq!(back.task_id, "t-2");
    }
}
