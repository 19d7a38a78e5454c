//! Generative proposer.

use std::sync::Arc;

use async_trait::async_trait;
use pair_coordination::pair::evaluation::extract_json_object;
use pair_coordination::{ProposalOutput, Proposer, RoleContext, RoleError};
use serde_json::{Map, Value};
use tracing::debug;

use crate::oracle::TextGenerator;
use crate::prompts;

/// Proposer backed by a text generator.
pub struct LlmProposer {
    id: String,
    generator: Arc<dyn TextGenerator>,
}

impl LlmProposer {
    pub fn new(id: impl Into<String>, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            id: id.into(),
            generator,
        }
    }
}

/// Turn generated text into a proposal.
///
/// JSON output supplies `rationale`, `content` and `diff_from_previous`.
/// Anything else is kept verbatim under `content.text`, with the first
/// non-empty line as rationale.
pub fn parse_proposal(iteration: u32, text: &str) -> ProposalOutput {
    if let Some(Value::Object(object)) = extract_json_object(text) {
        let rationale = object
            .get("rationale")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();
        let content = match object.get("content") {
            Some(Value::Object(map)) => map.clone(),
            Some(other) => {
                let mut map = Map::new();
                map.insert("text".into(), other.clone());
                map
            }
            None => object
                .iter()
                .filter(|(k, _)| k.as_str() != "rationale" && k.as_str() != "diff_from_previous")
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };
        let diff = object
            .get("diff_from_previous")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string);
        return ProposalOutput {
            iteration,
            content,
            rationale,
            diff_from_previous: diff,
        };
    }

    let rationale = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default()
        .to_string();
    ProposalOutput::new(iteration, rationale).with_field("text", text.trim())
}

#[async_trait]
impl Proposer for LlmProposer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn propose(
        &self,
        ctx: RoleContext<'_>,
        prior_feedback: Option<&str>,
    ) -> Result<ProposalOutput, RoleError> {
        let pair = ctx.pair.pair_type.as_str();
        let system = prompts::proposer_preamble(pair);
        let prompt = prompts::proposer_prompt(ctx, prior_feedback);

        let text = self
            .generator
            .generate(&system, &prompt)
            .await
            .map_err(|e| RoleError::Generation(e.to_string()))?;
        if text.trim().is_empty() {
            return Err(RoleError::Generation("empty proposal".into()));
        }

        let output = parse_proposal(ctx.iteration, &text);
        debug!(
            proposer = %self.id,
            pair,
            iteration = ctx.iteration,
            fields = output.content.len(),
            prompt_version = prompts::PROMPT_VERSION,
            "proposal generated"
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_proposal() {
        let text = "```json\n{\"rationale\": \"index the join\", \"content\": {\"sql\": \"CREATE INDEX\"}, \"diff_from_previous\": \"added index\"}\n```";
        let output = parse_proposal(2, text);
        assert_eq!(output.iteration, 2);
        assert_eq!(output.rationale, "index the join");
        assert_eq!(output.content["sql"], "CREATE INDEX");
        assert_eq!(output.diff_from_previous.as_deref(), Some("added index"));
    }

    #[test]
    fn test_parse_flat_json_proposal() {
        let output = parse_proposal(1, r#"{"rationale": "r", "endpoint": "/v1/login"}"#);
        assert_eq!(output.content["endpoint"], "/v1/login");
        assert!(!output.content.contains_key("rationale"));
        assert!(output.diff_from_previous.is_none());
    }

    #[test]
    fn test_parse_free_text_proposal() {
        let output = parse_proposal(1, "\n  Use a token bucket.\nDetails follow.");
        assert_eq!(output.rationale, "Use a token bucket.");
        assert_eq!(output.content["text"], "Use a token bucket.\nDetails follow.");
    }
}
