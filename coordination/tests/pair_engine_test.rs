//! Pair engine integration tests — the refinement loop against scripted
//! proposers and reviewers.
//!
//! Tests verify:
//! - Approval on the first iteration that satisfies the rule
//! - Escalation after exactly `max_iterations` with one conflict
//! - Reviewer failures degrade to the neutral verdict and the loop goes on
//! - Proposer failures reject the pair immediately
//! - Scores stay inside [0, 10]

use std::sync::Arc;

use pair_coordination::pair::evaluation::{SCORE_MAX, SCORE_MIN};
use pair_coordination::pair::scripted::{ReviewStep, ScriptedProposer, ScriptedReviewer};
use pair_coordination::{
    meets_approval_rule, DimensionScores, PairConfig, PairEngine, PairStatus, ReviewDecision,
    RunState,
};
use tokio_util::sync::CancellationToken;

fn scenario_config() -> PairConfig {
    PairConfig::new("backend", "backend-dev", "backend-critic")
        .with_thresholds(7.0, 5.0)
        .with_max_iterations(3)
}

fn engine(config: PairConfig, proposer: Arc<ScriptedProposer>, reviewer: ScriptedReviewer) -> PairEngine {
    PairEngine::new(config, proposer, Arc::new(reviewer))
}

fn state() -> RunState {
    RunState::new("task-1", "Add pagination to the orders endpoint")
}

// ── Scenario A: approval on iteration 2 ────────────────────────────

#[tokio::test]
async fn test_scenario_a_approved_on_second_iteration() {
    let proposer = Arc::new(ScriptedProposer::new("backend-dev"));
    let reviewer = ScriptedReviewer::sequence(
        "backend-critic",
        [
            DimensionScores::uniform(6.0),
            DimensionScores::new(9.0, 8.0, 7.5, 7.0, 6.0),
        ],
    );
    let engine = engine(scenario_config(), proposer.clone(), reviewer);

    let outcome = engine.execute(&state(), &CancellationToken::new()).await;

    assert_eq!(outcome.run.status, PairStatus::Approved);
    assert_eq!(outcome.run.iterations.len(), 2);
    assert!(outcome.conflict.is_none());

    let final_eval = outcome.run.final_evaluation.as_ref().unwrap();
    assert!((final_eval.average() - 7.5).abs() < 1e-9);
    assert!((final_eval.floor() - 6.0).abs() < 1e-9);
    assert_eq!(outcome.run.final_output.as_ref().unwrap().iteration, 2);

    // Feedback from iteration 1 reached the proposer on iteration 2.
    let log = proposer.feedback_log();
    assert_eq!(log.len(), 2);
    assert!(log[0].is_none());
    assert!(log[1].as_deref().unwrap().contains("raise"));
}

// ── Scenario B: escalation after the full budget ───────────────────

#[tokio::test]
async fn test_scenario_b_escalated_after_budget() {
    let proposer = Arc::new(ScriptedProposer::new("backend-dev"));
    let reviewer = ScriptedReviewer::constant("backend-critic", DimensionScores::uniform(6.0));
    let engine = engine(scenario_config(), proposer, reviewer);

    let outcome = engine.execute(&state(), &CancellationToken::new()).await;

    assert_eq!(outcome.run.status, PairStatus::Escalated);
    assert_eq!(outcome.run.iterations.len(), 3);
    let conflict = outcome.conflict.expect("escalation produces a conflict");
    assert_eq!(conflict.pair_type.as_str(), "backend");
    assert_eq!(conflict.iterations_attempted, 3);
    assert!(!conflict.resolved);
    assert_eq!(conflict.context_f64("last_average"), Some(6.0));
    assert!(conflict.reviewer_position.contains("backend-critic"));
}

// ── Scenario C: reviewer failure is recovered ──────────────────────

#[tokio::test]
async fn test_scenario_c_reviewer_failure_uses_neutral_verdict() {
    let proposer = Arc::new(ScriptedProposer::new("backend-dev"));
    let reviewer = ScriptedReviewer::new("backend-critic")
        .at(1, ReviewStep::Fail("connection reset".into()))
        .at(2, ReviewStep::Scores(DimensionScores::uniform(8.0)));
    let engine = engine(scenario_config(), proposer.clone(), reviewer);

    let outcome = engine.execute(&state(), &CancellationToken::new()).await;

    assert_eq!(outcome.run.status, PairStatus::Approved);
    assert_eq!(outcome.run.iterations.len(), 2);

    let first = &outcome.run.iterations[0].verdict;
    assert!(first.is_fallback());
    assert_eq!(first.decision, ReviewDecision::RequestRevision);
    for (_, score) in first.evaluation.scores.iter() {
        assert_eq!(score, 5.0);
    }

    let log = proposer.feedback_log();
    let carried = log[1].as_deref().expect("fallback verdict carried as feedback");
    assert!(carried.contains("reviewer failed"));
    assert!(carried.contains("connection reset"));
}

// ── Scenario D: proposer failure rejects immediately ───────────────

#[tokio::test]
async fn test_scenario_d_proposer_failure_rejects() {
    let proposer = Arc::new(ScriptedProposer::new("backend-dev").failing_at(1));
    let reviewer = ScriptedReviewer::constant("backend-critic", DimensionScores::uniform(9.0));
    let engine = engine(scenario_config(), proposer, reviewer);

    let outcome = engine.execute(&state(), &CancellationToken::new()).await;

    assert_eq!(outcome.run.status, PairStatus::Rejected);
    assert!(outcome.run.iterations.is_empty());
    assert!(outcome.conflict.is_none());
    assert!(outcome.run.final_evaluation.is_none());
    assert!(outcome
        .run
        .termination_reason
        .as_deref()
        .unwrap()
        .starts_with("proposer failed"));
}

#[tokio::test]
async fn test_proposer_failure_mid_run_keeps_history() {
    let proposer = Arc::new(ScriptedProposer::new("backend-dev").failing_at(2));
    let reviewer = ScriptedReviewer::constant("backend-critic", DimensionScores::uniform(4.0));
    let outcome = engine(scenario_config(), proposer, reviewer)
        .execute(&state(), &CancellationToken::new())
        .await;

    assert_eq!(outcome.run.status, PairStatus::Rejected);
    assert_eq!(outcome.run.iterations.len(), 1);
    assert!(outcome.conflict.is_none());
}

// ── Iteration bound and approval correctness ───────────────────────

#[tokio::test]
async fn test_iterations_never_exceed_budget() {
    for max_iterations in 1..=5 {
        let config = scenario_config().with_max_iterations(max_iterations);
        let low = ScriptedReviewer::constant("backend-critic", DimensionScores::uniform(3.0));
        let outcome = engine(config.clone(), Arc::new(ScriptedProposer::new("backend-dev")), low)
            .execute(&state(), &CancellationToken::new())
            .await;
        assert_eq!(outcome.run.status, PairStatus::Escalated);
        assert_eq!(outcome.run.iterations.len() as u32, max_iterations);

        let high = ScriptedReviewer::constant("backend-critic", DimensionScores::uniform(9.0));
        let outcome = engine(config, Arc::new(ScriptedProposer::new("backend-dev")), high)
            .execute(&state(), &CancellationToken::new())
            .await;
        assert_eq!(outcome.run.status, PairStatus::Approved);
        assert_eq!(outcome.run.iterations.len(), 1);
    }
}

#[tokio::test]
async fn test_high_average_with_low_floor_is_not_approved() {
    // Average 8.0 but one dimension under the floor.
    let scores = DimensionScores::new(10.0, 10.0, 10.0, 10.0, 0.0);
    let reviewer = ScriptedReviewer::constant("backend-critic", scores);
    let outcome = engine(scenario_config(), Arc::new(ScriptedProposer::new("backend-dev")), reviewer)
        .execute(&state(), &CancellationToken::new())
        .await;

    assert_eq!(outcome.run.status, PairStatus::Escalated);
    for record in &outcome.run.iterations {
        assert!(!meets_approval_rule(&record.verdict.evaluation, &scenario_config()));
    }
}

#[tokio::test]
async fn test_approved_iff_final_evaluation_meets_rule() {
    let config = scenario_config();
    let cases = [
        (DimensionScores::uniform(7.0), PairStatus::Approved),
        (DimensionScores::uniform(6.99), PairStatus::Escalated),
        (DimensionScores::new(9.0, 9.0, 9.0, 9.0, 5.0), PairStatus::Approved),
        (DimensionScores::new(9.0, 9.0, 9.0, 9.0, 4.9), PairStatus::Escalated),
    ];
    for (scores, expected) in cases {
        let reviewer = ScriptedReviewer::constant("backend-critic", scores);
        let outcome = engine(config.clone(), Arc::new(ScriptedProposer::new("backend-dev")), reviewer)
            .execute(&state(), &CancellationToken::new())
            .await;
        assert_eq!(outcome.run.status, expected, "{:?}", scores);
        let final_eval = outcome.run.final_evaluation.as_ref().unwrap();
        assert_eq!(
            outcome.run.status == PairStatus::Approved,
            meets_approval_rule(final_eval, &config)
        );
    }
}

// ── Score bounds ───────────────────────────────────────────────────

#[tokio::test]
async fn test_scores_are_clamped_into_range() {
    let reviewer = ScriptedReviewer::constant(
        "backend-critic",
        DimensionScores::new(14.0, -2.0, f64::INFINITY, 11.0, 10.5),
    );
    let outcome = engine(scenario_config(), Arc::new(ScriptedProposer::new("backend-dev")), reviewer)
        .execute(&state(), &CancellationToken::new())
        .await;

    for record in &outcome.run.iterations {
        for (_, score) in record.verdict.evaluation.scores.iter() {
            assert!((SCORE_MIN..=SCORE_MAX).contains(&score));
        }
    }
}

// ── Cancellation ───────────────────────────────────────────────────

#[tokio::test]
async fn test_cancelled_pair_is_rejected_not_dropped() {
    let proposer = Arc::new(
        ScriptedProposer::new("backend-dev").with_delay(std::time::Duration::from_secs(5)),
    );
    let reviewer = ScriptedReviewer::constant("backend-critic", DimensionScores::uniform(9.0));
    let engine = engine(scenario_config(), proposer, reviewer);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let outcome = engine.execute(&state(), &cancel).await;
    assert_eq!(outcome.run.status, PairStatus::Rejected);
    assert_eq!(
        outcome.run.termination_reason.as_deref(),
        Some("cancelled during iteration 1")
    );
    assert!(outcome.run.finished_at.is_some());
}
