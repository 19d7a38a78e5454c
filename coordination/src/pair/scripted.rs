//! Deterministic roles driven by a per-iteration script.
//!
//! Used for dry runs and tests; no content generation involved.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::evaluation::{DimensionScores, ReviewDecision, ReviewEvaluation, ReviewVerdict};
use super::roles::{Proposer, RoleContext, RoleError, Reviewer};
use super::run::ProposalOutput;

/// Proposer that echoes the task and records the feedback it receives.
pub struct ScriptedProposer {
    id: String,
    fail_at: Option<u32>,
    delay: Option<Duration>,
    feedback_log: Mutex<Vec<Option<String>>>,
}

impl ScriptedProposer {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fail_at: None,
            delay: None,
            feedback_log: Mutex::new(Vec::new()),
        }
    }

    /// Fail when asked for `iteration`.
    pub fn failing_at(mut self, iteration: u32) -> Self {
        self.fail_at = Some(iteration);
        self
    }

    /// Sleep before every proposal.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Prior feedback received, one entry per call.
    pub fn feedback_log(&self) -> Vec<Option<String>> {
        self.feedback_log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Proposer for ScriptedProposer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn propose(
        &self,
        ctx: RoleContext<'_>,
        prior_feedback: Option<&str>,
    ) -> Result<ProposalOutput, RoleError> {
        if let Ok(mut log) = self.feedback_log.lock() {
            log.push(prior_feedback.map(str::to_string));
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_at == Some(ctx.iteration) {
            return Err(RoleError::Generation(format!(
                "scripted failure at iteration {}",
                ctx.iteration
            )));
        }

        let mut output = ProposalOutput::new(
            ctx.iteration,
            format!("{} proposal {} for {}", self.id, ctx.iteration, ctx.pair.pair_type),
        )
        .with_field("task", ctx.state.original_request.clone())
        .with_field("pair_type", ctx.pair.pair_type.to_string());
        if prior_feedback.is_some() {
            output = output.with_diff(format!("revised after iteration {}", ctx.iteration - 1));
        }
        Ok(output)
    }
}

/// One scripted review step.
#[derive(Debug, Clone)]
pub enum ReviewStep {
    Scores(DimensionScores),
    Fail(String),
}

/// Reviewer returning scripted scores per iteration.
///
/// Iterations past the end of the script repeat the last step.
pub struct ScriptedReviewer {
    id: String,
    steps: BTreeMap<u32, ReviewStep>,
    fallback: ReviewStep,
}

impl ScriptedReviewer {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            steps: BTreeMap::new(),
            fallback: ReviewStep::Scores(DimensionScores::neutral()),
        }
    }

    /// Same scores on every iteration.
    pub fn constant(id: impl Into<String>, scores: DimensionScores) -> Self {
        let mut reviewer = Self::new(id);
        reviewer.fallback = ReviewStep::Scores(scores);
        reviewer
    }

    /// Scores per iteration, starting at iteration 1.
    pub fn sequence(
        id: impl Into<String>,
        scores: impl IntoIterator<Item = DimensionScores>,
    ) -> Self {
        let mut reviewer = Self::new(id);
        for (i, s) in scores.into_iter().enumerate() {
            reviewer = reviewer.at(i as u32 + 1, ReviewStep::Scores(s));
        }
        reviewer
    }

    pub fn at(mut self, iteration: u32, step: ReviewStep) -> Self {
        self.steps.insert(iteration, step.clone());
        if self.steps.keys().next_back() == Some(&iteration) {
            self.fallback = step;
        }
        self
    }

    fn step_for(&self, iteration: u32) -> &ReviewStep {
        self.steps.get(&iteration).unwrap_or(&self.fallback)
    }
}

#[async_trait]
impl Reviewer for ScriptedReviewer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn review(
        &self,
        ctx: RoleContext<'_>,
        output: &ProposalOutput,
    ) -> Result<ReviewVerdict, RoleError> {
        match self.step_for(ctx.iteration) {
            ReviewStep::Fail(message) => Err(RoleError::Generation(message.clone())),
            ReviewStep::Scores(scores) => {
                let scores = *scores;
                let weakest = scores.weakest();
                let mut evaluation = ReviewEvaluation::new(
                    scores,
                    format!("{} reviewed iteration {}", self.id, output.iteration),
                );
                evaluation.approved = scores.average() >= ctx.pair.approval_threshold
                    && scores.floor() >= ctx.pair.min_score_threshold;

                let decision = if evaluation.approved {
                    ReviewDecision::Approved
                } else {
                    evaluation.concerns.push(format!("{} is weakest", weakest));
                    ReviewDecision::RequestRevision
                };
                let mut verdict = ReviewVerdict::new(evaluation, decision);
                if decision == ReviewDecision::RequestRevision {
                    verdict.must_address.push(format!("raise {} score", weakest));
                }
                Ok(verdict)
            }
        }
    }
}
