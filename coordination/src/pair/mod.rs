//! Proposer/reviewer pairs — the iterative refinement loop.
//!
//! # Pair flow
//!
//! ```text
//! Pending → InProgress → propose → review → [decide]
//!              │            │         │         │
//!              │            └─────────┘         ├─ Approve  → Approved
//!              │          (carry feedback)      ├─ Continue → propose
//!              │                                └─ Escalate → Escalated (+ Conflict)
//!              └─ proposer error / cancellation → Rejected
//! ```

pub mod config;
pub mod decision;
pub mod engine;
pub mod evaluation;
pub mod feedback;
pub mod registry;
pub mod roles;
pub mod run;
pub mod scripted;

pub use config::{PairConfig, PairType};
pub use decision::{decide, meets_approval_rule, PairDecision};
pub use engine::{PairEngine, PairOutcome};
pub use evaluation::{
    parse_evaluation, parse_verdict, Dimension, DimensionScores, ReviewDecision,
    ReviewEvaluation, ReviewVerdict,
};
pub use feedback::format_feedback;
pub use registry::PairRegistry;
pub use roles::{Proposer, Reviewer, RoleContext, RoleError};
pub use run::{IterationRecord, PairRun, PairStatus, ProposalOutput};
