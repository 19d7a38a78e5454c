//! Pair registry — one engine per configured pair type, dispatched by name.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::config::{PairConfig, PairType};
use super::engine::{PairEngine, PairOutcome};
use super::roles::{Proposer, Reviewer};
use crate::error::{CoordinationError, CoordinationResult};
use crate::run::state::RunState;

/// Name-keyed table of pair engines, built at startup.
#[derive(Default)]
pub struct PairRegistry {
    engines: BTreeMap<PairType, PairEngine>,
}

impl PairRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pair. Fails on an invalid config or a duplicate pair type.
    pub fn register(
        &mut self,
        config: PairConfig,
        proposer: Arc<dyn Proposer>,
        reviewer: Arc<dyn Reviewer>,
    ) -> CoordinationResult<()> {
        config.validate()?;
        if self.engines.contains_key(&config.pair_type) {
            return Err(CoordinationError::DuplicatePairType(config.pair_type));
        }
        if proposer.id() != config.proposer_id || reviewer.id() != config.reviewer_id {
            warn!(
                pair = %config.pair_type,
                expected_proposer = %config.proposer_id,
                actual_proposer = proposer.id(),
                expected_reviewer = %config.reviewer_id,
                actual_reviewer = reviewer.id(),
                "role ids differ from pair config"
            );
        }
        debug!(pair = %config.pair_type, "pair registered");
        self.engines.insert(
            config.pair_type.clone(),
            PairEngine::new(config, proposer, reviewer),
        );
        Ok(())
    }

    pub fn contains(&self, pair_type: &PairType) -> bool {
        self.engines.contains_key(pair_type)
    }

    pub fn pair_types(&self) -> impl Iterator<Item = &PairType> {
        self.engines.keys()
    }

    pub fn config(&self, pair_type: &PairType) -> Option<&PairConfig> {
        self.engines.get(pair_type).map(PairEngine::config)
    }

    pub fn configs(&self) -> impl Iterator<Item = &PairConfig> {
        self.engines.values().map(PairEngine::config)
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    /// Fail on the first pair type in `pair_types` that was never registered.
    pub fn ensure_registered<'a>(
        &self,
        pair_types: impl IntoIterator<Item = &'a PairType>,
    ) -> CoordinationResult<()> {
        match pair_types.into_iter().find(|p| !self.contains(p)) {
            Some(missing) => Err(CoordinationError::UnregisteredPairType(missing.clone())),
            None => Ok(()),
        }
    }

    /// Run the pair registered under `pair_type`.
    pub async fn execute(
        &self,
        pair_type: &PairType,
        state: &RunState,
        cancel: &CancellationToken,
    ) -> CoordinationResult<PairOutcome> {
        let engine = self
            .engines
            .get(pair_type)
            .ok_or_else(|| CoordinationError::UnregisteredPairType(pair_type.clone()))?;
        Ok(engine.execute(state, cancel).await)
    }
}
