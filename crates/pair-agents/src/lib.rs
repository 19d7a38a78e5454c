//! LLM-backed roles, pair-table configuration and telemetry for the
//! pair coordination engine.

#![allow(clippy::uninlined_format_args)]

pub mod agents;
pub mod config;
pub mod oracle;
pub mod prompts;
pub mod telemetry;

pub use agents::coordinator::LlmCoordinator;
pub use agents::proposer::LlmProposer;
pub use agents::reviewer::LlmReviewer;
pub use agents::AgentFactory;
pub use config::{AgentsConfig, PairEntry, PairTable};
pub use oracle::{ChatCompletionsClient, OracleError, TextGenerator};
