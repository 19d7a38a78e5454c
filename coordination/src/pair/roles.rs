//! Capability contracts for pair members.
//!
//! Concrete personas (tech lead, backend, security, …) implement these
//! traits and are chosen at registration time. Implementations only ever
//! see a shared reference to the run; they return typed results and never
//! mutate run state.

use async_trait::async_trait;
use thiserror::Error;

use super::config::PairConfig;
use super::evaluation::ReviewVerdict;
use super::run::ProposalOutput;
use crate::run::state::RunState;

/// Errors a role implementation may return.
#[derive(Debug, Error)]
pub enum RoleError {
    #[error("content generation failed: {0}")]
    Generation(String),

    #[error("could not parse model output: {0}")]
    Parse(String),

    #[error("cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

/// Read-only context handed to every role call.
#[derive(Debug, Clone, Copy)]
pub struct RoleContext<'a> {
    /// Shared run state (task, plan, other pairs' results).
    pub state: &'a RunState,
    /// Config of the pair being driven.
    pub pair: &'a PairConfig,
    /// Current iteration (1-indexed).
    pub iteration: u32,
}

impl<'a> RoleContext<'a> {
    pub fn new(state: &'a RunState, pair: &'a PairConfig, iteration: u32) -> Self {
        Self {
            state,
            pair,
            iteration,
        }
    }

    /// Whether this is the last iteration the pair may use.
    pub fn is_final_iteration(&self) -> bool {
        self.iteration >= self.pair.max_iterations
    }
}

/// Produces a candidate solution each iteration.
#[async_trait]
pub trait Proposer: Send + Sync {
    /// Persona identifier, matched against `PairConfig::proposer_id`.
    fn id(&self) -> &str;

    /// Produce the proposal for `ctx.iteration`.
    ///
    /// `prior_feedback` is the formatted verdict of the previous iteration,
    /// `None` on the first.
    async fn propose(
        &self,
        ctx: RoleContext<'_>,
        prior_feedback: Option<&str>,
    ) -> Result<ProposalOutput, RoleError>;
}

/// Scores a proposal on the five dimensions and renders a decision.
///
/// Implementations must always return all five scores; when the underlying
/// generation cannot be parsed they return
/// [`ReviewVerdict::neutral_fallback`] instead of a partial verdict.
#[async_trait]
pub trait Reviewer: Send + Sync {
    /// Persona identifier, matched against `PairConfig::reviewer_id`.
    fn id(&self) -> &str;

    async fn review(
        &self,
        ctx: RoleContext<'_>,
        output: &ProposalOutput,
    ) -> Result<ReviewVerdict, RoleError>;
}
