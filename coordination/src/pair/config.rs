//! Per-pair configuration.

use serde::{Deserialize, Serialize};

use crate::error::{CoordinationError, CoordinationResult};
use crate::pair::evaluation::{SCORE_MAX, SCORE_MIN};

/// Name of a pair type (e.g. `"security"`, `"backend"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PairType(String);

impl PairType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PairType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PairType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for PairType {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl std::borrow::Borrow<str> for PairType {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Immutable configuration for one proposer/reviewer pair.
///
/// Thresholds are pair-specific: a security pair usually demands a higher
/// bar and more iterations than a frontend pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairConfig {
    /// Pair type this config governs.
    pub pair_type: PairType,
    /// Identifier of the proposer persona.
    pub proposer_id: String,
    /// Identifier of the reviewer persona.
    pub reviewer_id: String,
    /// Maximum refinement iterations (≥ 1).
    pub max_iterations: u32,
    /// Minimum mean score across the five dimensions.
    pub approval_threshold: f64,
    /// Minimum score any single dimension may have.
    pub min_score_threshold: f64,
}

impl PairConfig {
    pub fn new(
        pair_type: impl Into<PairType>,
        proposer_id: impl Into<String>,
        reviewer_id: impl Into<String>,
    ) -> Self {
        Self {
            pair_type: pair_type.into(),
            proposer_id: proposer_id.into(),
            reviewer_id: reviewer_id.into(),
            max_iterations: 3,
            approval_threshold: 7.0,
            min_score_threshold: 5.0,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_thresholds(mut self, approval_threshold: f64, min_score_threshold: f64) -> Self {
        self.approval_threshold = approval_threshold;
        self.min_score_threshold = min_score_threshold;
        self
    }

    /// Reject configs the engine cannot run.
    pub fn validate(&self) -> CoordinationResult<()> {
        let invalid = |reason: String| CoordinationError::InvalidConfig {
            pair_type: self.pair_type.clone(),
            reason,
        };

        if self.pair_type.as_str().trim().is_empty() {
            return Err(invalid("pair type must not be empty".to_string()));
        }
        if self.max_iterations == 0 {
            return Err(invalid("max_iterations must be at least 1".to_string()));
        }
        for (name, value) in [
            ("approval_threshold", self.approval_threshold),
            ("min_score_threshold", self.min_score_threshold),
        ] {
            if !value.is_finite() || !(SCORE_MIN..=SCORE_MAX).contains(&value) {
                return Err(invalid(format!(
                    "{} must lie in [{}, {}], got {}",
                    name, SCORE_MIN, SCORE_MAX, value
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PairConfig::new("backend", "backend-dev", "backend-reviewer");
        assert_eq!(config.max_iterations, 3);
        assert!((config.approval_threshold - 7.0).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let config = PairConfig::new("qa", "qa", "qa-critic").with_max_iterations(0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_iterations"));
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let config = PairConfig::new("qa", "qa", "qa-critic").with_thresholds(11.0, 5.0);
        assert!(config.validate().is_err());

        let config = PairConfig::new("qa", "qa", "qa-critic").with_thresholds(7.0, f64::NAN);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_pair_type_rejected() {
        let config = PairConfig::new("  ", "p", "r");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pair_type_serde_transparent() {
        let json = serde_json::to_string(&PairType::from("security")).unwrap();
        assert_eq!(json, "\"security\"");
    }
}
