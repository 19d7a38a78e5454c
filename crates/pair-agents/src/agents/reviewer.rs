//! Generative adversarial reviewer.

use std::sync::Arc;

use async_trait::async_trait;
use pair_coordination::pair::evaluation::UNPARSEABLE_CONCERN;
use pair_coordination::{
    parse_verdict, ProposalOutput, ReviewVerdict, Reviewer, RoleContext, RoleError,
};
use tracing::{debug, warn};

use crate::oracle::TextGenerator;
use crate::prompts;

/// Reviewer backed by a text generator.
///
/// Oracle errors are returned as [`RoleError::Generation`]; output without
/// all five scores degrades to the neutral fallback verdict.
pub struct LlmReviewer {
    id: String,
    generator: Arc<dyn TextGenerator>,
}

impl LlmReviewer {
    pub fn new(id: impl Into<String>, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            id: id.into(),
            generator,
        }
    }
}

#[async_trait]
impl Reviewer for LlmReviewer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn review(
        &self,
        ctx: RoleContext<'_>,
        output: &ProposalOutput,
    ) -> Result<ReviewVerdict, RoleError> {
        let pair = ctx.pair.pair_type.as_str();
        let system = prompts::reviewer_preamble(pair);
        let prompt = prompts::reviewer_prompt(ctx, output);

        let text = self
            .generator
            .generate(&system, &prompt)
            .await
            .map_err(|e| RoleError::Generation(e.to_string()))?;

        match parse_verdict(&text) {
            Some(verdict) => {
                debug!(
                    reviewer = %self.id,
                    pair,
                    iteration = ctx.iteration,
                    average = verdict.evaluation.average(),
                    decision = %verdict.decision,
                    "review parsed"
                );
                Ok(verdict)
            }
            None => {
                warn!(
                    reviewer = %self.id,
                    pair,
                    iteration = ctx.iteration,
                    chars = text.len(),
                    "review unparseable; using neutral verdict"
                );
                Ok(ReviewVerdict::neutral_fallback(UNPARSEABLE_CONCERN))
            }
        }
    }
}
