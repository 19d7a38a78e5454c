//! Endpoint and pair-table configuration.
//!
//! `AgentsConfig` reads the oracle endpoint from `PAIR_LLM_*` environment
//! variables. `PairTable` is the TOML catalogue of pairs, validated on load
//! and turned into engine configs and a classifier.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use pair_coordination::coordinator::classifier::{default_profiles, PairProfile};
use pair_coordination::{PairConfig, PairType, TaskClassifier};
use serde::{Deserialize, Serialize};

/// Oracle endpoint configuration.
#[derive(Debug, Clone)]
pub struct AgentsConfig {
    /// Full chat-completions URL.
    pub llm_url: String,
    /// Model used by proposers and reviewers.
    pub model: String,
    /// Model used by the coordinator.
    pub coordinator_model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        let model = std::env::var("PAIR_LLM_MODEL").unwrap_or_else(|_| "qwen2.5-coder-32b".into());
        Self {
            llm_url: std::env::var("PAIR_LLM_URL")
                .unwrap_or_else(|_| "http://localhost:8000/v1/chat/completions".into()),
            coordinator_model: std::env::var("PAIR_COORDINATOR_MODEL")
                .unwrap_or_else(|_| model.clone()),
            model,
            api_key: std::env::var("PAIR_LLM_API_KEY").ok().filter(|k| !k.is_empty()),
            timeout_secs: std::env::var("PAIR_LLM_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(300),
        }
    }
}

fn default_max_iterations() -> u32 {
    3
}

fn default_approval_threshold() -> f64 {
    7.0
}

fn default_min_score_threshold() -> f64 {
    5.0
}

fn default_baseline() -> String {
    "qa".into()
}

fn default_security() -> String {
    "security".into()
}

/// One `[[pairs]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairEntry {
    pub pair_type: String,
    pub proposer: String,
    pub reviewer: String,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_approval_threshold")]
    pub approval_threshold: f64,
    #[serde(default = "default_min_score_threshold")]
    pub min_score_threshold: f64,
    /// Classifier signals; the built-in catalogue's signals when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signals: Option<Vec<String>>,
}

impl PairEntry {
    fn new(
        pair_type: &str,
        proposer: &str,
        reviewer: &str,
        max_iterations: u32,
        approval_threshold: f64,
        min_score_threshold: f64,
    ) -> Self {
        Self {
            pair_type: pair_type.into(),
            proposer: proposer.into(),
            reviewer: reviewer.into(),
            max_iterations,
            approval_threshold,
            min_score_threshold,
            signals: None,
        }
    }

    pub fn to_config(&self) -> PairConfig {
        PairConfig::new(self.pair_type.as_str(), &self.proposer, &self.reviewer)
            .with_max_iterations(self.max_iterations)
            .with_thresholds(self.approval_threshold, self.min_score_threshold)
    }
}

/// Pair configuration table. Entry order is execution precedence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairTable {
    /// Pair type always included in a plan.
    #[serde(default = "default_baseline")]
    pub baseline: String,
    /// Pair type forced on sensitive requests.
    #[serde(default = "default_security")]
    pub security: String,
    pub pairs: Vec<PairEntry>,
}

impl Default for PairTable {
    fn default() -> Self {
        Self {
            baseline: default_baseline(),
            security: default_security(),
            pairs: vec![
                PairEntry::new("architecture", "tech-lead", "principal-reviewer", 4, 7.5, 6.0),
                PairEntry::new("database", "data-engineer", "dba-critic", 3, 7.5, 6.0),
                PairEntry::new("backend", "backend-engineer", "backend-critic", 3, 7.0, 5.0),
                PairEntry::new("frontend", "frontend-engineer", "ux-critic", 3, 7.0, 5.0),
                PairEntry::new("security", "security-engineer", "security-auditor", 5, 8.0, 7.0),
                PairEntry::new("devops", "devops-engineer", "sre-critic", 3, 7.0, 5.0),
                PairEntry::new("documentation", "tech-writer", "docs-critic", 2, 6.5, 4.0),
                PairEntry::new("qa", "qa-engineer", "qa-critic", 3, 7.0, 5.0),
            ],
        }
    }
}

impl PairTable {
    /// Load and validate a TOML pair table.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pair table {}", path.display()))?;
        Self::from_toml_str(&text)
            .with_context(|| format!("Invalid pair table {}", path.display()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let table: Self = toml::from_str(text).context("Failed to parse pair table TOML")?;
        table.validate()?;
        Ok(table)
    }

    /// Every entry must be a valid pair config, types must be unique, and
    /// the baseline pair must be present.
    pub fn validate(&self) -> Result<()> {
        if self.pairs.is_empty() {
            bail!("pair table has no [[pairs]] entries");
        }
        let mut seen = BTreeSet::new();
        for entry in &self.pairs {
            entry.to_config().validate()?;
            if !seen.insert(entry.pair_type.as_str()) {
                bail!("pair type {} listed twice", entry.pair_type);
            }
        }
        if !seen.contains(self.baseline.as_str()) {
            bail!("baseline pair {} missing from pair table", self.baseline);
        }
        Ok(())
    }

    pub fn pair_configs(&self) -> Vec<PairConfig> {
        self.pairs.iter().map(PairEntry::to_config).collect()
    }

    pub fn entry(&self, pair_type: &str) -> Option<&PairEntry> {
        self.pairs.iter().find(|e| e.pair_type == pair_type)
    }

    /// Classifier whose catalogue is exactly this table.
    pub fn classifier(&self) -> TaskClassifier {
        let builtin = default_profiles();
        let profiles = self
            .pairs
            .iter()
            .enumerate()
            .map(|(position, entry)| {
                let pair_type = PairType::new(entry.pair_type.as_str());
                let signals = entry.signals.clone().unwrap_or_else(|| {
                    builtin
                        .iter()
                        .find(|p| p.pair_type == pair_type)
                        .map(|p| p.signals.clone())
                        .unwrap_or_default()
                });
                PairProfile {
                    pair_type,
                    signals,
                    precedence: (position as u32 + 1) * 10,
                }
            })
            .collect();
        TaskClassifier {
            profiles,
            baseline: PairType::new(self.baseline.as_str()),
            security: PairType::new(self.security.as_str()),
            ..TaskClassifier::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_valid() {
        let table = PairTable::default();
        table.validate().unwrap();
        let security = table.entry("security").unwrap();
        assert_eq!(security.approval_threshold, 8.0);
        assert_eq!(security.min_score_threshold, 7.0);
        assert_eq!(security.max_iterations, 5);
        assert_eq!(table.pairs.len(), 8);
    }

    #[test]
    fn test_from_toml_defaults() {
        let table = PairTable::from_toml_str(
            r#"
[[pairs]]
pair_type = "qa"
proposer = "qa-dev"
reviewer = "qa-critic"

[[pairs]]
pair_type = "payments"
proposer = "payments-dev"
reviewer = "payments-critic"
approval_threshold = 8.5
signals = ["payment", "invoice"]
"#,
        )
        .unwrap();
        assert_eq!(table.baseline, "qa");
        let qa = table.entry("qa").unwrap();
        assert_eq!(qa.max_iterations, 3);
        assert_eq!(qa.approval_threshold, 7.0);
        let payments = table.entry("payments").unwrap().to_config();
        assert_eq!(payments.approval_threshold, 8.5);
        assert_eq!(payments.min_score_threshold, 5.0);
    }

    #[test]
    fn test_duplicate_rejected() {
        let err = PairTable::from_toml_str(
            r#"
[[pairs]]
pair_type = "qa"
proposer = "a"
reviewer = "b"

[[pairs]]
pair_type = "qa"
proposer = "c"
reviewer = "d"
"#,
        )
        .unwrap_err();
        assert!(format!("{:#}", err).contains("listed twice"));
    }

    #[test]
    fn test_missing_baseline_rejected() {
        let err = PairTable::from_toml_str(
            r#"
[[pairs]]
pair_type = "backend"
proposer = "a"
reviewer = "b"
"#,
        )
        .unwrap_err();
        assert!(format!("{:#}", err).contains("baseline pair qa"));
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let err = PairTable::from_toml_str(
            r#"
[[pairs]]
pair_type = "qa"
proposer = "a"
reviewer = "b"
approval_threshold = 11.0
"#,
        )
        .unwrap_err();
        assert!(format!("{:#}", err).contains("qa"));
    }

    #[test]
    fn test_classifier_uses_table_signals_and_order() {
        let mut table = PairTable::default();
        table.pairs.retain(|e| e.pair_type == "backend" || e.pair_type == "qa");
        table.pairs.push(PairEntry {
            signals: Some(vec!["invoice".into()]),
            ..PairEntry::new("payments", "p", "r", 3, 7.0, 5.0)
        });
        let plan = table.classifier().classify("Add an invoice API endpoint");
        let names: Vec<&str> = plan.execution_order.iter().map(PairType::as_str).collect();
        assert_eq!(names, vec!["backend", "qa", "payments"]);
    }
}
