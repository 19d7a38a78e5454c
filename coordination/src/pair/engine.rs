//! Pair engine — drives one proposer/reviewer pair to a terminal status.
//!
//! ```text
//! for iteration in 1..=max_iterations:
//!   propose(feedback) ──err──▶ REJECTED
//!   review(output)    ──err──▶ neutral fallback verdict (loop continues)
//!   decide(evaluation):
//!     Approve  ▶ APPROVED
//!     Continue ▶ feedback = format(verdict)
//!     Escalate ▶ ESCALATED + Conflict
//! ```
//!
//! The engine only reads the run state. Its result is a [`PairOutcome`]
//! that the run controller merges.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::PairConfig;
use super::decision::{decide, PairDecision};
use super::evaluation::ReviewVerdict;
use super::feedback::format_feedback;
use super::roles::{Proposer, RoleContext, Reviewer};
use super::run::{IterationRecord, PairRun, PairStatus};
use crate::run::state::{Conflict, RunState};

/// Result of executing one pair: the terminal run and, when escalated,
/// the conflict to append to the run state.
#[derive(Debug, Clone)]
pub struct PairOutcome {
    pub run: PairRun,
    pub conflict: Option<Conflict>,
}

impl PairOutcome {
    fn settled(run: PairRun) -> Self {
        Self {
            run,
            conflict: None,
        }
    }

    pub fn status(&self) -> PairStatus {
        self.run.status
    }
}

/// Runs the refinement loop for one pair.
pub struct PairEngine {
    config: PairConfig,
    proposer: Arc<dyn Proposer>,
    reviewer: Arc<dyn Reviewer>,
}

impl PairEngine {
    pub fn new(
        config: PairConfig,
        proposer: Arc<dyn Proposer>,
        reviewer: Arc<dyn Reviewer>,
    ) -> Self {
        Self {
            config,
            proposer,
            reviewer,
        }
    }

    pub fn config(&self) -> &PairConfig {
        &self.config
    }

    pub fn proposer_id(&self) -> &str {
        self.proposer.id()
    }

    pub fn reviewer_id(&self) -> &str {
        self.reviewer.id()
    }

    /// Drive the pair until APPROVED, REJECTED, or ESCALATED.
    ///
    /// Cancellation marks the pair REJECTED, keeping the iterations that
    /// completed before it fired.
    pub async fn execute(&self, state: &RunState, cancel: &CancellationToken) -> PairOutcome {
        let pair = &self.config.pair_type;
        let mut run = PairRun::new(pair.clone());
        run.begin();
        info!(
            %pair,
            proposer = self.proposer.id(),
            reviewer = self.reviewer.id(),
            max_iterations = self.config.max_iterations,
            "pair started"
        );

        let mut feedback: Option<String> = None;

        for iteration in 1..=self.config.max_iterations {
            let ctx = RoleContext::new(state, &self.config, iteration);
            let started_at = Utc::now();
            let clock = Instant::now();

            let proposal = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(%pair, iteration, "cancelled during proposal");
                    run.finish(
                        PairStatus::Rejected,
                        format!("cancelled during iteration {}", iteration),
                    );
                    return PairOutcome::settled(run);
                }
                result = self.proposer.propose(ctx, feedback.as_deref()) => result,
            };

            let mut output = match proposal {
                Ok(output) => output,
                Err(e) => {
                    warn!(%pair, iteration, error = %e, "proposer failed; rejecting pair");
                    run.finish(PairStatus::Rejected, format!("proposer failed: {}", e));
                    return PairOutcome::settled(run);
                }
            };
            if output.iteration != iteration {
                debug!(
                    %pair,
                    iteration,
                    reported = output.iteration,
                    "restamping proposal iteration"
                );
                output.iteration = iteration;
            }

            let verdict = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(%pair, iteration, "cancelled during review");
                    run.finish(
                        PairStatus::Rejected,
                        format!("cancelled during iteration {}", iteration),
                    );
                    return PairOutcome::settled(run);
                }
                result = self.reviewer.review(ctx, &output) => match result {
                    Ok(verdict) => verdict,
                    Err(e) => {
                        warn!(
                            %pair,
                            iteration,
                            error = %e,
                            "reviewer failed; using neutral verdict"
                        );
                        ReviewVerdict::neutral_fallback(format!("reviewer failed: {}", e))
                    }
                },
            };

            let decision = decide(&verdict.evaluation, &self.config, iteration);
            info!(
                %pair,
                iteration,
                average = verdict.evaluation.average(),
                floor = verdict.evaluation.floor(),
                reviewer_decision = %verdict.decision,
                %decision,
                "iteration reviewed"
            );

            let next_feedback = match decision {
                PairDecision::Continue => Some(format_feedback(&verdict)),
                _ => None,
            };
            run.record(IterationRecord {
                output,
                verdict,
                started_at,
                duration_ms: clock.elapsed().as_millis() as u64,
            });

            match decision {
                PairDecision::Approve => {
                    run.finish(
                        PairStatus::Approved,
                        format!("approved at iteration {}", iteration),
                    );
                    info!(%pair, iteration, "pair approved");
                    return PairOutcome::settled(run);
                }
                PairDecision::Escalate => {
                    run.finish(
                        PairStatus::Escalated,
                        format!(
                            "no approval within {} iterations",
                            self.config.max_iterations
                        ),
                    );
                    let conflict = Conflict::from_escalation(&run, &self.config);
                    warn!(%pair, conflict = %conflict.id, "pair escalated");
                    return PairOutcome {
                        run,
                        conflict: Some(conflict),
                    };
                }
                PairDecision::Continue => feedback = next_feedback,
            }
        }

        // Only reachable with a zero iteration budget, which registration rejects.
        run.finish(PairStatus::Rejected, "iteration budget is zero");
        PairOutcome::settled(run)
    }
}
