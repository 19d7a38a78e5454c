//! Final verdict aggregation.

use crate::pair::config::PairType;
use crate::pair::evaluation::{SCORE_MAX, SCORE_MIN};
use crate::pair::run::{PairRun, PairStatus};
use crate::run::state::{FinalVerdict, RulingDecision, RunState};

fn artifact(run: &PairRun) -> Option<String> {
    run.final_output
        .as_ref()
        .map(|o| format!("{}/iteration-{}", run.pair_type, o.iteration))
}

/// Mean of every pair's final average; 0 when no pair has an evaluation.
pub fn quality_score(state: &RunState) -> f64 {
    let averages: Vec<f64> = state
        .pair_results()
        .values()
        .filter_map(|r| r.final_evaluation.as_ref())
        .map(|e| e.average())
        .collect();
    if averages.is_empty() {
        return 0.0;
    }
    let mean = averages.iter().sum::<f64>() / averages.len() as f64;
    mean.clamp(SCORE_MIN, SCORE_MAX)
}

/// Aggregate pair results and rulings into the run's final verdict.
///
/// The run is approved only when no pair was rejected, every planned pair
/// produced a result, no conflict is open, and no ruling upheld the
/// reviewer.
pub fn aggregate(state: &RunState) -> FinalVerdict {
    let planned: Vec<&PairType> = state
        .plan()
        .map(|p| p.execution_order.iter().collect())
        .unwrap_or_default();
    let missing: Vec<&PairType> = planned
        .iter()
        .copied()
        .filter(|p| state.pair_result(p).is_none())
        .collect();

    let runs: Vec<&PairRun> = state.pair_results().values().collect();
    let approved = state.approved_pairs();
    let rejected = state.failed_pairs();
    let escalated = state.escalated_pairs();

    let mut conditions = Vec::new();
    let mut next_steps = Vec::new();
    let mut artifacts_to_commit = Vec::new();
    let mut upheld_reviewer = 0usize;

    for run in &runs {
        match run.status {
            PairStatus::Approved => artifacts_to_commit.extend(artifact(run)),
            PairStatus::Rejected => next_steps.push(format!(
                "re-run {}: {}",
                run.pair_type,
                run.termination_reason.as_deref().unwrap_or("rejected")
            )),
            _ => {}
        }
    }

    for conflict in state.conflicts() {
        let pair = &conflict.pair_type;
        let Some(ruling) = conflict.ruling.as_ref() else {
            next_steps.push(format!("resolve open conflict on {}", pair));
            continue;
        };
        match ruling.decision {
            RulingDecision::ApproveProposer => {
                artifacts_to_commit.extend(state.pair_result(pair).and_then(artifact));
            }
            RulingDecision::Compromise => {
                conditions.push(format!("{}: {}", pair, ruling.binding_instruction));
                artifacts_to_commit.extend(state.pair_result(pair).and_then(artifact));
            }
            RulingDecision::ApproveReviewer => {
                upheld_reviewer += 1;
                next_steps.push(format!("revise {}: {}", pair, ruling.binding_instruction));
            }
        }
    }

    for pair in &missing {
        next_steps.push(format!("execute planned pair {}", pair));
    }

    let open = state.open_conflicts().count();
    let criteria_met =
        state.plan().is_some() && missing.is_empty() && open == 0 && upheld_reviewer == 0;
    let all_pairs_passed = !runs.is_empty()
        && missing.is_empty()
        && runs.iter().all(|r| r.status == PairStatus::Approved);
    let approved_run = !runs.is_empty() && rejected.is_empty() && criteria_met;
    let quality = quality_score(state);

    let mut rationale = format!(
        "{}/{} pairs approved, {} rejected, {} escalated; {} conflicts resolved; quality {:.2}/10",
        approved.len(),
        runs.len(),
        rejected.len(),
        escalated.len(),
        state.resolved_conflict_count(),
        quality
    );
    if !rejected.is_empty() {
        let names: Vec<String> = rejected.iter().map(|p| p.to_string()).collect();
        rationale.push_str(&format!("; rejected: {}", names.join(", ")));
    }
    if upheld_reviewer > 0 {
        rationale.push_str(&format!("; {} ruling(s) upheld the reviewer", upheld_reviewer));
    }
    if open > 0 {
        rationale.push_str(&format!("; {} conflict(s) unresolved", open));
    }
    if runs.is_empty() {
        rationale.push_str("; no pair produced a result");
    }

    if approved_run && next_steps.is_empty() {
        next_steps.push("commit the approved artifacts".to_string());
    }

    FinalVerdict {
        approved: approved_run,
        rationale,
        quality_score: quality,
        all_pairs_passed,
        conflicts_resolved: state.resolved_conflict_count(),
        conditions,
        next_steps,
        artifacts_to_commit,
    }
}
