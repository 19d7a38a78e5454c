//! Feedback formatting carried from one iteration into the next.

use super::evaluation::ReviewVerdict;

/// Render a verdict as the prior-feedback string for the next proposal.
pub fn format_feedback(verdict: &ReviewVerdict) -> String {
    let evaluation = &verdict.evaluation;
    let mut out = String::new();

    out.push_str(&format!(
        "## Review decision: {}\n\n",
        verdict.decision
    ));
    out.push_str(&format!(
        "Scores (average {:.2}, lowest {:.2}):\n",
        evaluation.average(),
        evaluation.floor()
    ));
    for (dimension, score) in evaluation.scores.iter() {
        out.push_str(&format!("- {}: {:.1}/10\n", dimension, score));
    }

    if !evaluation.feedback.is_empty() {
        out.push_str(&format!("\n## Reviewer feedback\n\n{}\n", evaluation.feedback));
    }

    push_section(&mut out, "Must address", &verdict.must_address);
    push_section(&mut out, "Nice to have", &verdict.nice_to_have);

    let extra_concerns: Vec<String> = evaluation
        .concerns
        .iter()
        .filter(|c| !verdict.must_address.contains(c))
        .cloned()
        .collect();
    push_section(&mut out, "Other concerns", &extra_concerns);

    out
}

fn push_section(out: &mut String, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    out.push_str(&format!("\n## {}\n\n", title));
    for (i, item) in items.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, item));
    }
}
