//! Task classifier — turns a request into a run plan.
//!
//! Each catalogue entry carries domain signals (word prefixes or phrases).
//! A pair is selected when any of its signals appears in the request. The
//! baseline quality pair is always selected, and the security pair is
//! forced whenever access-control, secret, or sensitive-data signals appear.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::pair::config::PairType;
use crate::run::state::{Complexity, RunPlan};

/// Catalogue entry for one pair type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairProfile {
    pub pair_type: PairType,
    /// Lowercase word prefixes or phrases that select this pair. A trailing
    /// `$` requires a whole word.
    pub signals: Vec<String>,
    /// Position in the execution order (lower runs first).
    pub precedence: u32,
}

impl PairProfile {
    pub fn new(pair_type: &str, precedence: u32, signals: &[&str]) -> Self {
        Self {
            pair_type: PairType::new(pair_type),
            signals: signals.iter().map(|s| s.to_string()).collect(),
            precedence,
        }
    }
}

/// Signals of access control, secrets, or sensitive data.
const SENSITIVE_SIGNALS: &[&str] = &[
    "auth$",
    "authn",
    "authenticat",
    "authoriz",
    "login",
    "password",
    "passwd",
    "credential",
    "secret",
    "token",
    "api key",
    "private key",
    "encrypt",
    "decrypt",
    "permission",
    "access control",
    "rbac",
    "role based",
    "oauth",
    "sso",
    "session",
    "sensitive",
    "pii",
    "personal data",
    "personally identifiable",
    "gdpr",
    "hipaa",
    "ssn",
    "credit card",
    "vulnerab",
];

/// Signals of irreversible or high-stakes changes.
const CRITICAL_SIGNALS: &[&str] = &[
    "payment",
    "billing",
    "financial",
    "medical",
    "health record",
    "production data",
    "irreversible",
    "delete all",
    "drop table",
    "compliance",
];

/// Clauses that state a constraint.
const CONSTRAINT_MARKERS: &[&str] = &[
    "must",
    "must not",
    "do not",
    "don't",
    "never",
    "without",
    "only",
    "should not",
    "no more than",
    "at most",
    "within",
    "required",
];

/// Default pair catalogue.
pub fn default_profiles() -> Vec<PairProfile> {
    vec![
        PairProfile::new(
            "architecture",
            10,
            &[
                "architect", "design", "system", "refactor", "migrat", "microservice",
                "scalab", "integration", "platform", "monolith",
            ],
        ),
        PairProfile::new(
            "database",
            20,
            &[
                "database", "schema", "sql", "query", "queries", "table", "index",
                "postgres", "mysql", "sqlite", "mongo", "storage", "persist",
            ],
        ),
        PairProfile::new(
            "backend",
            30,
            &[
                "api", "endpoint", "server", "service", "backend", "rest$", "graphql",
                "handler", "queue", "webhook", "route",
            ],
        ),
        PairProfile::new(
            "frontend",
            40,
            &[
                "ui$", "frontend", "page", "component", "react", "vue", "css", "form$",
                "forms$",
                "dashboard", "button", "layout", "screen", "widget",
            ],
        ),
        PairProfile {
            pair_type: PairType::new("security"),
            signals: SENSITIVE_SIGNALS.iter().map(|s| s.to_string()).collect(),
            precedence: 50,
        },
        PairProfile::new(
            "devops",
            60,
            &[
                "deploy", "ci$", "cd$", "pipeline", "docker", "kubernetes", "k8s",
                "infrastructure", "terraform", "helm", "monitoring", "alerting",
            ],
        ),
        PairProfile::new(
            "documentation",
            70,
            &["docs", "document", "readme", "guide", "tutorial", "changelog"],
        ),
        PairProfile::new(
            "qa",
            90,
            &["test", "qa", "coverage", "regression", "bug", "flaky"],
        ),
    ]
}

/// Rule-based classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskClassifier {
    pub profiles: Vec<PairProfile>,
    /// Always selected.
    pub baseline: PairType,
    /// Forced on sensitive signals.
    pub security: PairType,
    /// Requests longer than this many words raise complexity one level.
    pub long_request_words: usize,
}

impl Default for TaskClassifier {
    fn default() -> Self {
        Self {
            profiles: default_profiles(),
            baseline: PairType::new("qa"),
            security: PairType::new("security"),
            long_request_words: 120,
        }
    }
}

/// Lowercase, punctuation collapsed to spaces, padded so every word is
/// preceded by a space.
fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push(' ');
    let mut last_space = true;
    for ch in text.chars().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() {
            out.push(ch);
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    if !last_space {
        out.push(' ');
    }
    out
}

/// Whether `signal` starts a word (or phrase) in `normalized`. A trailing
/// `$` restricts the signal to whole words: `rest$` matches "rest" but not
/// "restore".
fn has_signal(normalized: &str, signal: &str) -> bool {
    match signal.strip_suffix('$') {
        Some(word) => normalized.contains(&normalize(word)),
        None => normalized.contains(&format!(" {}", normalize(signal).trim())),
    }
}

fn any_signal(normalized: &str, signals: &[&str]) -> bool {
    signals.iter().any(|s| has_signal(normalized, s))
}

fn one_level_up(complexity: Complexity) -> Complexity {
    match complexity {
        Complexity::Low => Complexity::Medium,
        Complexity::Medium => Complexity::High,
        Complexity::High | Complexity::Critical => Complexity::Critical,
    }
}

/// First sentence of the request, cut to 160 characters.
pub fn summarize(request: &str) -> String {
    let first = request
        .split(['.', '!', '?', '\n'])
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or("");
    if first.chars().count() > 160 {
        let cut: String = first.chars().take(157).collect();
        format!("{}...", cut.trim_end())
    } else {
        first.to_string()
    }
}

/// Sentences carrying a constraint marker.
pub fn extract_constraints(request: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    request
        .split(['.', '!', '?', ';', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter(|s| any_signal(&normalize(s), CONSTRAINT_MARKERS))
        .filter(|s| seen.insert(s.to_lowercase()))
        .map(str::to_string)
        .collect()
}

impl TaskClassifier {
    /// Keep only profiles whose pair type is in `available`.
    pub fn restricted_to<'a>(mut self, available: impl IntoIterator<Item = &'a PairType>) -> Self {
        let available: BTreeSet<&PairType> = available.into_iter().collect();
        self.profiles.retain(|p| available.contains(&p.pair_type));
        self
    }

    fn precedence_of(&self, pair_type: &PairType) -> u32 {
        self.profiles
            .iter()
            .find(|p| &p.pair_type == pair_type)
            .map(|p| p.precedence)
            .unwrap_or(u32::MAX)
    }

    /// Whether the request mentions access control, secrets, or sensitive data.
    pub fn is_sensitive(&self, request: &str) -> bool {
        any_signal(&normalize(request), SENSITIVE_SIGNALS)
    }

    /// Sort by catalogue precedence and drop duplicates, keeping the first.
    pub fn order(&self, pairs: impl IntoIterator<Item = PairType>) -> Vec<PairType> {
        let mut seen = BTreeSet::new();
        let mut ordered: Vec<PairType> = pairs
            .into_iter()
            .filter(|p| seen.insert(p.clone()))
            .collect();
        ordered.sort_by_key(|p| self.precedence_of(p));
        ordered
    }

    pub fn knows(&self, pair_type: &PairType) -> bool {
        self.profiles.iter().any(|p| &p.pair_type == pair_type)
    }

    /// Drop pair types outside the catalogue, add the security pair for
    /// sensitive requests and the baseline pair always, then order.
    pub fn enforce_invariants(&self, request: &str, selected: Vec<PairType>) -> Vec<PairType> {
        let mut pairs: Vec<PairType> = selected.into_iter().filter(|p| self.knows(p)).collect();
        if self.is_sensitive(request) {
            if self.knows(&self.security) {
                pairs.push(self.security.clone());
            } else {
                warn!(pair = %self.security, "sensitive request but no security pair in catalogue");
            }
        }
        pairs.push(self.baseline.clone());
        self.order(pairs)
    }

    /// Complexity from domain breadth, request length, and risk signals.
    pub fn estimate_complexity(&self, request: &str, domain_pairs: usize) -> Complexity {
        let normalized = normalize(request);
        let mut complexity = match domain_pairs {
            0 | 1 => Complexity::Low,
            2 => Complexity::Medium,
            3 | 4 => Complexity::High,
            _ => Complexity::Critical,
        };
        if request.split_whitespace().count() > self.long_request_words {
            complexity = one_level_up(complexity);
        }
        let sensitive = any_signal(&normalized, SENSITIVE_SIGNALS);
        if sensitive {
            complexity = complexity.max(Complexity::High);
        }
        if any_signal(&normalized, CRITICAL_SIGNALS) {
            complexity = if sensitive {
                Complexity::Critical
            } else {
                complexity.max(Complexity::High)
            };
        }
        complexity
    }

    /// Classify a request into a plan.
    pub fn classify(&self, request: &str) -> RunPlan {
        let normalized = normalize(request);

        let domain: Vec<PairType> = self
            .profiles
            .iter()
            .filter(|p| p.pair_type != self.baseline)
            .filter(|p| p.signals.iter().any(|s| has_signal(&normalized, s)))
            .map(|p| p.pair_type.clone())
            .collect();
        let complexity = self.estimate_complexity(request, domain.len());
        let execution_order = self.enforce_invariants(request, domain);
        let constraints = extract_constraints(request);
        let success_criteria = self.success_criteria(&execution_order, &constraints);

        RunPlan {
            task_summary: summarize(request),
            execution_order,
            success_criteria,
            constraints,
            complexity,
        }
    }

    /// Criteria the final verdict checks.
    pub fn success_criteria(&self, pairs: &[PairType], constraints: &[String]) -> Vec<String> {
        let mut criteria: Vec<String> = pairs
            .iter()
            .map(|p| format!("{} pair reaches approval or a ruling in the proposer's favour", p))
            .collect();
        criteria.push("no conflict left unresolved".to_string());
        criteria.extend(constraints.iter().map(|c| format!("respects: {}", c)));
        criteria
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(plan: &RunPlan) -> Vec<&str> {
        plan.execution_order.iter().map(PairType::as_str).collect()
    }

    #[test]
    fn test_baseline_always_present() {
        let plan = TaskClassifier::default().classify("Tidy up the wording of the changelog");
        assert_eq!(names(&plan), vec!["documentation", "qa"]);
        let plan = TaskClassifier::default().classify("");
        assert_eq!(names(&plan), vec!["qa"]);
    }

    #[test]
    fn test_security_forced_on_sensitive_requests() {
        let classifier = TaskClassifier::default();
        for request in [
            "Add role based access control to the admin area",
            "Rotate the stored secrets for the billing worker",
            "Export customers' personal data as CSV",
        ] {
            let plan = classifier.classify(request);
            assert!(plan.includes(&"security".into()), "{}", request);
            assert!(plan.complexity >= Complexity::High, "{}", request);
        }
    }

    #[test]
    fn test_order_follows_precedence() {
        let plan = TaskClassifier::default().classify(
            "Add a REST endpoint and a React page backed by a new postgres table, with login",
        );
        assert_eq!(
            names(&plan),
            vec!["database", "backend", "frontend", "security", "qa"]
        );
        assert_eq!(plan.complexity, Complexity::High);
    }

    #[test]
    fn test_word_prefix_matching() {
        let normalized = normalize("Rapid prototyping of APIs");
        assert!(has_signal(&normalized, "api"));
        assert!(!has_signal(&normalized, "pid"));
        assert!(has_signal(&normalize("uses Access-Control lists"), "access control"));
    }

    #[test]
    fn test_constraints_extracted() {
        let constraints = extract_constraints(
            "Build the export. It must not block the UI; only admins can trigger it. Be nice.",
        );
        assert_eq!(
            constraints,
            vec!["It must not block the UI", "only admins can trigger it"]
        );
    }

    #[test]
    fn test_success_criteria_cover_pairs_and_constraints() {
        let plan = TaskClassifier::default().classify("Add an API endpoint. Do not break clients.");
        assert!(plan.success_criteria.iter().any(|c| c.starts_with("backend pair")));
        assert!(plan.success_criteria.iter().any(|c| c.starts_with("qa pair")));
        assert!(plan
            .success_criteria
            .contains(&"respects: Do not break clients".to_string()));
    }

    #[test]
    fn test_critical_with_sensitive_and_high_stakes() {
        let plan = TaskClassifier::default()
            .classify("Store credit card tokens for the payment flow");
        assert_eq!(plan.complexity, Complexity::Critical);
    }

    #[test]
    fn test_restricted_catalogue() {
        let available: Vec<PairType> = vec!["backend".into(), "qa".into()];
        let classifier = TaskClassifier::default().restricted_to(&available);
        let plan = classifier.classify("Add an API endpoint with a React form");
        assert_eq!(names(&plan), vec!["backend", "qa"]);
    }

    #[test]
    fn test_invariants_drop_unknown_types() {
        let available: Vec<PairType> = vec!["backend".into(), "qa".into()];
        let classifier = TaskClassifier::default().restricted_to(&available);
        let pairs = classifier.enforce_invariants(
            "rotate the password hashes",
            vec!["mobile".into(), "backend".into()],
        );
        assert_eq!(pairs, vec![PairType::from("backend"), PairType::from("qa")]);
    }

    #[test]
    fn test_order_dedups() {
        let classifier = TaskClassifier::default();
        let ordered = classifier.order(vec!["qa".into(), "backend".into(), "qa".into()]);
        assert_eq!(ordered, vec![PairType::from("backend"), PairType::from("qa")]);
    }

    #[test]
    fn test_summary_truncated() {
        let long = "word ".repeat(60);
        let summary = summarize(&long);
        assert!(summary.ends_with("..."));
        assert!(summary.chars().count() <= 160);
    }

    #[test]
    fn test_whole_word_signals() {
        let normalized = normalize("Restart the REST server");
        assert!(has_signal(&normalized, "rest$"));
        assert!(!has_signal(&normalize("restore the backup"), "rest$"));
        assert!(!has_signal(&normalize("format the changelog"), "form$"));
        assert!(has_signal(&normalize("a signup form."), "form$"));
    }

    #[test]
    fn test_author_is_not_sensitive() {
        let classifier = TaskClassifier::default();
        assert!(!classifier.is_sensitive("Update the author bio on the about page"));
        assert!(classifier.is_sensitive("Add OAuth authentication"));
        assert!(classifier.is_sensitive("Check authorization on every handler"));
        assert!(classifier.is_sensitive("auth middleware for the gateway"));

        let plan = classifier.classify("Update the author bio on the about page");
        assert!(!plan.includes(&"security".into()));
        assert!(plan.complexity < Complexity::High);

        let plan = classifier.classify("Restore the nightly backup and format the changelog");
        assert!(!plan.includes(&"backend".into()));
        assert!(!plan.includes(&"frontend".into()));
    }
}
