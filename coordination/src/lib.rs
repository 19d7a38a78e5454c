//! Pair Coordination Library
//!
//! Adversarial proposer/reviewer pairs under a single coordinator:
//! - Pair engine: bounded propose → review → decide refinement loop
//! - Pair registry: name-keyed table of configured pairs
//! - Coordinator: task classification, conflict arbitration, final verdict
//! - Run controller: top-level phase machine with cancellation
//!
//! # Run flow
//!
//! ```text
//! RunState(task) ─▶ classify ─▶ RunPlan ─▶ pairs (plan order) ─▶ conflicts? ─▶ FinalVerdict
//!                                              │                      │
//!                                              └── rejected > approved ┴─▶ FAILED
//! ```
//!
//! Proposers and reviewers only ever see `&RunState`; every change is a
//! value returned to the [`RunController`] and merged there.

#![allow(clippy::uninlined_format_args)]

pub mod coordinator;
pub mod error;
pub mod pair;
pub mod run;

pub use error::{CoordinationError, CoordinationResult};

// Re-export pair types
pub use pair::{
    decide, format_feedback, meets_approval_rule, parse_evaluation, parse_verdict, Dimension,
    DimensionScores, IterationRecord, PairConfig, PairDecision, PairEngine, PairOutcome,
    PairRegistry, PairRun, PairStatus, PairType, ProposalOutput, Proposer, ReviewDecision,
    ReviewEvaluation, ReviewVerdict, Reviewer, RoleContext, RoleError,
};

// Re-export run types
pub use run::{
    route_after_pairs, Complexity, Conflict, ExecutionMode, FinalVerdict, PhaseTransition,
    RunController, RunPhase, RunPlan, RunState, RunStatus, Ruling, RulingDecision, StateDelta,
    TransitionError,
};

// Re-export coordinator types
pub use coordinator::{
    aggregate, ArbitrationPolicy, Coordinator, PairProfile, RuleCoordinator, TaskClassifier,
};
