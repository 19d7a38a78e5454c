//! Review evaluations — the five scored dimensions, verdicts, and the
//! parser that turns free-text reviewer output into typed evaluations.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lowest possible dimension score.
pub const SCORE_MIN: f64 = 0.0;
/// Highest possible dimension score.
pub const SCORE_MAX: f64 = 10.0;
/// Score used when a dimension cannot be determined.
pub const NEUTRAL_SCORE: f64 = 5.0;

/// Concern recorded when reviewer output could not be mapped to scores.
pub const UNPARSEABLE_CONCERN: &str = "could not parse evaluation";

static FENCED_JSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```").unwrap());

/// Clamp a raw score into `[0, 10]`; non-finite values become neutral.
pub fn clamp_score(raw: f64) -> f64 {
    if raw.is_finite() {
        raw.clamp(SCORE_MIN, SCORE_MAX)
    } else {
        NEUTRAL_SCORE
    }
}

/// The five scored review dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Correctness,
    Completeness,
    Quality,
    Performance,
    Security,
}

impl Dimension {
    pub const ALL: [Dimension; 5] = [
        Self::Correctness,
        Self::Completeness,
        Self::Quality,
        Self::Performance,
        Self::Security,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Correctness => "correctness",
            Self::Completeness => "completeness",
            Self::Quality => "quality",
            Self::Performance => "performance",
            Self::Security => "security",
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Deserialize)]
struct ScoresRepr {
    correctness: f64,
    completeness: f64,
    quality: f64,
    performance: f64,
    security: f64,
}

impl From<ScoresRepr> for DimensionScores {
    fn from(repr: ScoresRepr) -> Self {
        Self::new(
            repr.correctness,
            repr.completeness,
            repr.quality,
            repr.performance,
            repr.security,
        )
    }
}

/// Dimension scores, always clamped to `[0, 10]`.
///
/// Fields are private so every construction path (including
/// deserialization) goes through the clamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "ScoresRepr")]
pub struct DimensionScores {
    correctness: f64,
    completeness: f64,
    quality: f64,
    performance: f64,
    security: f64,
}

impl DimensionScores {
    pub fn new(
        correctness: f64,
        completeness: f64,
        quality: f64,
        performance: f64,
        security: f64,
    ) -> Self {
        Self {
            correctness: clamp_score(correctness),
            completeness: clamp_score(completeness),
            quality: clamp_score(quality),
            performance: clamp_score(performance),
            security: clamp_score(security),
        }
    }

    /// Same score on every dimension.
    pub fn uniform(score: f64) -> Self {
        Self::new(score, score, score, score, score)
    }

    /// All dimensions at the neutral midpoint.
    pub fn neutral() -> Self {
        Self::uniform(NEUTRAL_SCORE)
    }

    pub fn get(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Correctness => self.correctness,
            Dimension::Completeness => self.completeness,
            Dimension::Quality => self.quality,
            Dimension::Performance => self.performance,
            Dimension::Security => self.security,
        }
    }

    /// `(dimension, score)` pairs in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (Dimension, f64)> + '_ {
        Dimension::ALL.into_iter().map(|d| (d, self.get(d)))
    }

    pub fn average(&self) -> f64 {
        self.iter().map(|(_, s)| s).sum::<f64>() / Dimension::ALL.len() as f64
    }

    pub fn floor(&self) -> f64 {
        self.iter().map(|(_, s)| s).fold(SCORE_MAX, f64::min)
    }

    /// Dimension holding the lowest score (first in canonical order on ties).
    pub fn weakest(&self) -> Dimension {
        let floor = self.floor();
        self.iter()
            .find(|(_, s)| *s <= floor)
            .map(|(d, _)| d)
            .unwrap_or(Dimension::Correctness)
    }
}

/// A reviewer's evaluation of one proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewEvaluation {
    pub scores: DimensionScores,
    /// Free-text feedback.
    pub feedback: String,
    pub concerns: Vec<String>,
    pub suggestions: Vec<String>,
    /// Approval as stated by the reviewer. The engine's approval rule is
    /// score-based and does not consult this flag.
    pub approved: bool,
}

impl ReviewEvaluation {
    pub fn new(scores: DimensionScores, feedback: impl Into<String>) -> Self {
        Self {
            scores,
            feedback: feedback.into(),
            concerns: Vec::new(),
            suggestions: Vec::new(),
            approved: false,
        }
    }

    pub fn average(&self) -> f64 {
        self.scores.average()
    }

    pub fn floor(&self) -> f64 {
        self.scores.floor()
    }
}

/// Decision rendered by a reviewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewDecision {
    Approved,
    Rejected,
    RequestRevision,
}

impl ReviewDecision {
    /// Lenient parse of a decision label produced by a model.
    pub fn parse(label: &str) -> Option<Self> {
        let normalized = label.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "approved" | "approve" | "accept" | "accepted" | "pass" => Some(Self::Approved),
            "rejected" | "reject" | "fail" | "blocked" => Some(Self::Rejected),
            "request_revision" | "revise" | "revision" | "request_changes" | "changes_requested"
            | "needs_revision" => Some(Self::RequestRevision),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReviewDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Approved => write!(f, "APPROVED"),
            Self::Rejected => write!(f, "REJECTED"),
            Self::RequestRevision => write!(f, "REQUEST_REVISION"),
        }
    }
}

/// A review evaluation plus the reviewer's decision and prioritized feedback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewVerdict {
    pub evaluation: ReviewEvaluation,
    pub decision: ReviewDecision,
    /// Items the proposer must fix before approval.
    pub must_address: Vec<String>,
    /// Optional improvements.
    pub nice_to_have: Vec<String>,
}

impl ReviewVerdict {
    pub fn new(evaluation: ReviewEvaluation, decision: ReviewDecision) -> Self {
        Self {
            evaluation,
            decision,
            must_address: Vec::new(),
            nice_to_have: Vec::new(),
        }
    }

    /// Neutral verdict substituted when a review fails or cannot be parsed:
    /// every score 5.0, decision REQUEST_REVISION, `concern` recorded.
    pub fn neutral_fallback(concern: impl Into<String>) -> Self {
        let concern = concern.into();
        let mut evaluation = ReviewEvaluation::new(DimensionScores::neutral(), concern.clone());
        evaluation.concerns.push(concern);
        Self::new(evaluation, ReviewDecision::RequestRevision)
    }

    /// Whether this verdict is a substituted fallback rather than a real review.
    pub fn is_fallback(&self) -> bool {
        self.evaluation.scores == DimensionScores::neutral()
            && self.decision == ReviewDecision::RequestRevision
            && self.evaluation.concerns.iter().any(|c| {
                c == UNPARSEABLE_CONCERN || c.starts_with("reviewer failed:")
            })
    }
}

/// Locate the JSON object in free-text model output.
///
/// Prefers a fenced ```json block, then falls back to the outermost braces.
pub fn extract_json_object(text: &str) -> Option<Value> {
    if let Some(caps) = FENCED_JSON.captures(text) {
        if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(&caps[1]) {
            return Some(value);
        }
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

fn lookup<'a>(object: &'a Value, key: &str) -> Option<&'a Value> {
    let map = object.as_object()?;
    map.get(key).or_else(|| {
        map.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    })
}

fn as_score(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches("/10").trim().parse().ok(),
        _ => None,
    }
}

fn string_list(object: &Value, key: &str) -> Vec<String> {
    match lookup(object, key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

fn text_field(object: &Value, key: &str) -> Option<String> {
    lookup(object, key)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
}

/// Parse reviewer output into an evaluation.
///
/// Returns `None` unless all five dimension scores are present and numeric;
/// callers substitute [`ReviewVerdict::neutral_fallback`] on `None` rather
/// than building a partial evaluation.
pub fn parse_evaluation(text: &str) -> Option<ReviewEvaluation> {
    let object = extract_json_object(text)?;
    let score_source = lookup(&object, "scores")
        .filter(|v| v.is_object())
        .unwrap_or(&object);

    let mut raw = [0.0f64; 5];
    for (slot, dimension) in raw.iter_mut().zip(Dimension::ALL) {
        *slot = lookup(score_source, dimension.as_str()).and_then(as_score)?;
    }
    let scores = DimensionScores::new(raw[0], raw[1], raw[2], raw[3], raw[4]);

    let decision = text_field(&object, "decision").and_then(|d| ReviewDecision::parse(&d));
    let approved = lookup(&object, "approved")
        .and_then(Value::as_bool)
        .unwrap_or(decision == Some(ReviewDecision::Approved));

    Some(ReviewEvaluation {
        scores,
        feedback: text_field(&object, "feedback").unwrap_or_default(),
        concerns: string_list(&object, "concerns"),
        suggestions: string_list(&object, "suggestions"),
        approved,
    })
}

/// Parse reviewer output into a full verdict.
///
/// A missing or unknown decision label is derived from the stated approval
/// flag. Missing `must_address` defaults to the concerns, missing
/// `nice_to_have` to the suggestions.
pub fn parse_verdict(text: &str) -> Option<ReviewVerdict> {
    let evaluation = parse_evaluation(text)?;
    let object = extract_json_object(text)?;

    let decision = text_field(&object, "decision")
        .and_then(|d| ReviewDecision::parse(&d))
        .unwrap_or(if evaluation.approved {
            ReviewDecision::Approved
        } else {
            ReviewDecision::RequestRevision
        });

    let mut must_address = string_list(&object, "must_address");
    if must_address.is_empty() && lookup(&object, "must_address").is_none() {
        must_address = evaluation.concerns.clone();
    }
    let mut nice_to_have = string_list(&object, "nice_to_have");
    if nice_to_have.is_empty() && lookup(&object, "nice_to_have").is_none() {
        nice_to_have = evaluation.suggestions.clone();
    }

    Some(ReviewVerdict {
        evaluation,
        decision,
        must_address,
        nice_to_have,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_and_floor() {
        let scores = DimensionScores::new(8.0, 6.0, 7.0, 9.0, 5.0);
        assert!((scores.average() - 7.0).abs() < 1e-9);
        assert!((scores.floor() - 5.0).abs() < 1e-9);
        assert_eq!(scores.weakest(), Dimension::Security);
    }

    #[test]
    fn test_scores_clamped() {
        let scores = DimensionScores::new(-3.0, 14.0, f64::NAN, 10.0, 0.0);
        assert_eq!(scores.get(Dimension::Correctness), 0.0);
        assert_eq!(scores.get(Dimension::Completeness), 10.0);
        assert_eq!(scores.get(Dimension::Quality), NEUTRAL_SCORE);
        for (_, score) in scores.iter() {
            assert!((SCORE_MIN..=SCORE_MAX).contains(&score));
        }
    }

    #[test]
    fn test_deserialize_clamps() {
        let json = r#"{"correctness":12,"completeness":5,"quality":5,"performance":5,"security":-1}"#;
        let scores: DimensionScores = serde_json::from_str(json).unwrap();
        assert_eq!(scores.get(Dimension::Correctness), 10.0);
        assert_eq!(scores.get(Dimension::Security), 0.0);
    }

    #[test]
    fn test_neutral_fallback() {
        let verdict = ReviewVerdict::neutral_fallback("reviewer failed: timeout");
        assert_eq!(verdict.decision, ReviewDecision::RequestRevision);
        assert!((verdict.evaluation.average() - 5.0).abs() < 1e-9);
        assert!((verdict.evaluation.floor() - 5.0).abs() < 1e-9);
        assert_eq!(verdict.evaluation.concerns, vec!["reviewer failed: timeout"]);
        assert!(verdict.is_fallback());
    }

    #[test]
    fn test_parse_fenced_nested_scores() {
        let text = r#"Here is my review.

```json
{
  "scores": {"correctness": 8, "completeness": 7.5, "quality": "7", "performance": 6, "security": 9},
  "feedback": "Solid overall",
  "concerns": ["no pagination"],
  "suggestions": ["add caching"],
  "approved": true,
  "decision": "approved"
}
```
"#;
        let verdict = parse_verdict(text).unwrap();
        assert_eq!(verdict.decision, ReviewDecision::Approved);
        assert!(verdict.evaluation.approved);
        assert!((verdict.evaluation.average() - 7.5).abs() < 1e-9);
        assert_eq!(verdict.evaluation.feedback, "Solid overall");
        // Defaults from concerns / suggestions.
        assert_eq!(verdict.must_address, vec!["no pagination"]);
        assert_eq!(verdict.nice_to_have, vec!["add caching"]);
    }

    #[test]
    fn test_parse_flat_scores_and_decision_variants() {
        let text = r#"{"Correctness": 4, "completeness": 4, "quality": 4, "performance": 4,
            "security": 4, "decision": "request changes", "must_address": ["fix auth"], "nice_to_have": []}"#;
        let verdict = parse_verdict(text).unwrap();
        assert_eq!(verdict.decision, ReviewDecision::RequestRevision);
        assert!(!verdict.evaluation.approved);
        assert_eq!(verdict.must_address, vec!["fix auth"]);
        assert!(verdict.nice_to_have.is_empty());
    }

    #[test]
    fn test_parse_missing_dimension_is_none() {
        let text = r#"{"scores": {"correctness": 8, "completeness": 7, "quality": 7, "performance": 6}}"#;
        assert!(parse_evaluation(text).is_none());
    }

    #[test]
    fn test_parse_garbage_is_none() {
        assert!(parse_evaluation("looks fine to me, ship it").is_none());
        assert!(parse_evaluation("} backwards {").is_none());
        assert!(parse_evaluation(r#"{"correctness": "high"}"#).is_none());
    }

    #[test]
    fn test_decision_parse() {
        assert_eq!(ReviewDecision::parse("Approve"), Some(ReviewDecision::Approved));
        assert_eq!(ReviewDecision::parse("REJECTED"), Some(ReviewDecision::Rejected));
        assert_eq!(
            ReviewDecision::parse("request-revision"),
            Some(ReviewDecision::RequestRevision)
        );
        assert_eq!(ReviewDecision::parse("maybe"), None);
    }

    #[test]
    fn test_decision_serde() {
        let json = serde_json::to_string(&ReviewDecision::RequestRevision).unwrap();
        assert_eq!(json, "\"REQUEST_REVISION\"");
    }
}
