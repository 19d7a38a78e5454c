//! Run-level orchestration: state, phases, and the controller.

pub mod controller;
pub mod phase;
pub mod state;

pub use controller::{route_after_pairs, ExecutionMode, RunController};
pub use phase::{PhaseTransition, RunPhase, TransitionError};
pub use state::{
    Complexity, Conflict, FinalVerdict, RunPlan, RunState, RunStatus, Ruling, RulingDecision,
    StateDelta,
};
