//! Engine error types.
//!
//! Quality problems (rejected proposals, unparseable reviews, escalations)
//! are outcomes recorded on the run, not errors. Only configuration and
//! coordinator failures surface here.

use thiserror::Error;

use crate::pair::config::PairType;
use crate::run::phase::TransitionError;

/// Result type alias for engine operations.
pub type CoordinationResult<T> = Result<T, CoordinationError>;

#[derive(Debug, Error)]
pub enum CoordinationError {
    #[error("pair type not registered: {0}")]
    UnregisteredPairType(PairType),

    #[error("pair type registered twice: {0}")]
    DuplicatePairType(PairType),

    #[error("invalid pair config for {pair_type}: {reason}")]
    InvalidConfig { pair_type: PairType, reason: String },

    #[error("run plan already set; plans are immutable once classified")]
    PlanAlreadySet,

    #[error("run plan missing; classify before executing pairs")]
    PlanMissing,

    #[error("conflict not found: {0}")]
    ConflictNotFound(String),

    #[error("coordinator failed: {0}")]
    Coordinator(String),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}
