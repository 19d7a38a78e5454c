//! Role builders for the pair engine.
//!
//! `AgentFactory` turns a [`PairTable`] into a populated [`PairRegistry`]
//! plus the matching coordinator, either oracle-backed or scripted.

pub mod coordinator;
pub mod proposer;
pub mod reviewer;

use std::sync::Arc;

use anyhow::{Context, Result};
use pair_coordination::pair::scripted::{ScriptedProposer, ScriptedReviewer};
use pair_coordination::{
    ArbitrationPolicy, Coordinator, DimensionScores, PairRegistry, RuleCoordinator,
};

use crate::config::{AgentsConfig, PairTable};
use crate::oracle::{ChatCompletionsClient, TextGenerator};
use coordinator::LlmCoordinator;
use proposer::LlmProposer;
use reviewer::LlmReviewer;

/// Builds registries and coordinators from a pair table.
pub struct AgentFactory {
    pub table: PairTable,
}

impl AgentFactory {
    pub fn new(table: PairTable) -> Self {
        Self { table }
    }

    pub fn rule_coordinator(&self) -> RuleCoordinator {
        RuleCoordinator::new(self.table.classifier(), ArbitrationPolicy::default())
    }

    /// Registry whose roles all share `generator`.
    pub fn llm_registry(&self, generator: Arc<dyn TextGenerator>) -> Result<PairRegistry> {
        let mut registry = PairRegistry::new();
        for config in self.table.pair_configs() {
            let proposer = LlmProposer::new(config.proposer_id.clone(), generator.clone());
            let reviewer = LlmReviewer::new(config.reviewer_id.clone(), generator.clone());
            let pair_type = config.pair_type.clone();
            registry
                .register(config, Arc::new(proposer), Arc::new(reviewer))
                .with_context(|| format!("Failed to register pair {}", pair_type))?;
        }
        Ok(registry)
    }

    /// Registry and coordinator talking to the configured endpoint.
    pub fn llm_agents(
        &self,
        config: &AgentsConfig,
    ) -> Result<(PairRegistry, Arc<dyn Coordinator>)> {
        let roles = ChatCompletionsClient::from_config(config)
            .context("Failed to build role client")?;
        let coordinator_client = roles.with_model(&config.coordinator_model).with_temperature(0.1);

        let registry = self.llm_registry(Arc::new(roles))?;
        let coordinator: Arc<dyn Coordinator> = Arc::new(LlmCoordinator::new(
            Arc::new(coordinator_client),
            self.rule_coordinator(),
        ));
        Ok((registry, coordinator))
    }

    /// Offline registry: every reviewer approves with `score` on each dimension.
    pub fn scripted_agents(&self, score: f64) -> Result<(PairRegistry, Arc<dyn Coordinator>)> {
        let mut registry = PairRegistry::new();
        for config in self.table.pair_configs() {
            let proposer = Arc::new(ScriptedProposer::new(config.proposer_id.clone()));
            let reviewer = Arc::new(ScriptedReviewer::constant(
                config.reviewer_id.clone(),
                DimensionScores::uniform(score),
            ));
            let pair_type = config.pair_type.clone();
            registry
                .register(config, proposer, reviewer)
                .with_context(|| format!("Failed to register pair {}", pair_type))?;
        }
        Ok((registry, Arc::new(self.rule_coordinator())))
    }
}
