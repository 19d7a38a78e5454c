//! Generative coordinator with a rule-based fallback.
//!
//! Classification and arbitration go to the oracle first. Oracle failures
//! and unparseable output fall back to [`RuleCoordinator`]. Generated plans
//! always pass through the classifier invariants: baseline pair present,
//! security pair on sensitive requests, nothing outside the catalogue.

use std::sync::Arc;

use async_trait::async_trait;
use pair_coordination::coordinator::{extract_constraints, summarize};
use pair_coordination::pair::evaluation::extract_json_object;
use pair_coordination::{
    Complexity, Conflict, CoordinationResult, Coordinator, PairType, RuleCoordinator, RunPlan,
    RunState, Ruling, RulingDecision,
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::oracle::TextGenerator;
use crate::prompts;

#[derive(Debug, Deserialize)]
struct GeneratedPlan {
    #[serde(default)]
    task_summary: Option<String>,
    #[serde(default)]
    execution_order: Vec<String>,
    #[serde(default)]
    success_criteria: Vec<String>,
    #[serde(default)]
    constraints: Vec<String>,
    #[serde(default)]
    complexity: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeneratedRuling {
    decision: String,
    #[serde(default)]
    rationale: String,
    #[serde(default)]
    binding_instruction: String,
}

pub struct LlmCoordinator {
    generator: Arc<dyn TextGenerator>,
    fallback: RuleCoordinator,
}

impl LlmCoordinator {
    pub fn new(generator: Arc<dyn TextGenerator>, fallback: RuleCoordinator) -> Self {
        Self { generator, fallback }
    }

    fn available(&self) -> Vec<String> {
        self.fallback
            .classifier()
            .profiles
            .iter()
            .map(|p| p.pair_type.to_string())
            .collect()
    }

    /// Build a plan from generated text, or `None` if it has no usable plan.
    fn plan_from(&self, state: &RunState, text: &str) -> Option<RunPlan> {
        let generated: GeneratedPlan = serde_json::from_value(extract_json_object(text)?).ok()?;
        let classifier = self.fallback.classifier();
        let request = &state.original_request;

        let selected: Vec<PairType> = generated
            .execution_order
            .iter()
            .map(|p| PairType::new(p.trim().to_lowercase()))
            .collect();
        let execution_order = classifier.enforce_invariants(request, selected);

        let domain_pairs = execution_order.len().saturating_sub(1);
        let rule_complexity = classifier.estimate_complexity(request, domain_pairs);
        let sensitive = classifier.is_sensitive(request);
        let complexity = generated
            .complexity
            .as_deref()
            .and_then(Complexity::parse)
            .map(|c| if sensitive { c.max(Complexity::High) } else { c })
            .unwrap_or(rule_complexity);

        let mut constraints = generated.constraints;
        if constraints.is_empty() {
            constraints = extract_constraints(request);
        }
        let mut success_criteria = generated.success_criteria;
        if success_criteria.is_empty() {
            success_criteria = classifier.success_criteria(&execution_order, &constraints);
        }

        Some(RunPlan {
            task_summary: generated
                .task_summary
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| summarize(request)),
            execution_order,
            success_criteria,
            constraints,
            complexity,
        })
    }

    fn ruling_from(text: &str) -> Option<Ruling> {
        let generated: GeneratedRuling = serde_json::from_value(extract_json_object(text)?).ok()?;
        let decision = RulingDecision::parse(&generated.decision)?;
        if generated.binding_instruction.trim().is_empty() {
            return None;
        }
        Some(Ruling::new(
            decision,
            generated.rationale.trim(),
            generated.binding_instruction.trim(),
        ))
    }
}

#[async_trait]
impl Coordinator for LlmCoordinator {
    fn id(&self) -> &str {
        "llm-coordinator"
    }

    async fn classify(&self, state: &RunState) -> CoordinationResult<RunPlan> {
        let prompt = prompts::classifier_prompt(state, &self.available());
        match self.generator.generate(prompts::CLASSIFIER_PREAMBLE, &prompt).await {
            Ok(text) => match self.plan_from(state, &text) {
                Some(plan) => {
                    info!(
                        task = %state.task_id,
                        pairs = plan.execution_order.len(),
                        "generated plan accepted"
                    );
                    Ok(plan)
                }
                None => {
                    warn!(
                        task = %state.task_id,
                        "generated plan unparseable; using rule classifier"
                    );
                    self.fallback.classify(state).await
                }
            },
            Err(e) => {
                warn!(
                    task = %state.task_id,
                    error = %e,
                    "classification oracle failed; using rule classifier"
                );
                self.fallback.classify(state).await
            }
        }
    }

    async fn resolve_conflict(
        &self,
        state: &RunState,
        conflict: &Conflict,
    ) -> CoordinationResult<Ruling> {
        let prompt = prompts::arbitration_prompt(state, conflict);
        match self.generator.generate(prompts::ARBITER_PREAMBLE, &prompt).await {
            Ok(text) => match Self::ruling_from(&text) {
                Some(ruling) => Ok(ruling),
                None => {
                    warn!(
                        conflict = %conflict.id,
                        "generated ruling unparseable; using rule arbitration"
                    );
                    self.fallback.resolve_conflict(state, conflict).await
                }
            },
            Err(e) => {
                warn!(
                    conflict = %conflict.id,
                    error = %e,
                    "arbitration oracle failed; using rule arbitration"
                );
                self.fallback.resolve_conflict(state, conflict).await
            }
        }
    }
}
