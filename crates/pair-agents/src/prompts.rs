//! System prompts and prompt builders for each role.
//!
//! Prompt versioning: bump `PROMPT_VERSION` whenever preamble content changes
//! so a response can be traced back to the prompt that produced it.

use pair_coordination::{Conflict, PairStatus, ProposalOutput, RoleContext, RunState};

/// Prompt version. Bump on any preamble content change.
pub const PROMPT_VERSION: &str = "1.2.0";

/// Proposer preamble. `{persona}` is replaced with the pair persona.
pub const PROPOSER_PREAMBLE: &str = "\
You are {persona}. You own one slice of a larger task and propose a concrete, \
complete solution for it. A reviewer will score your proposal and may send it \
back with required changes; address every required change on the next round.

Respond with a single JSON object and nothing else:
{
  \"rationale\": \"why this proposal solves the task and respects the constraints\",
  \"content\": { \"...\": \"the proposal itself, structured as you see fit\" },
  \"diff_from_previous\": \"what changed since your last proposal, or null\"
}";

/// Reviewer preamble. `{persona}` is replaced with the pair persona.
pub const REVIEWER_PREAMBLE: &str = "\
You are {persona}, acting as an adversarial reviewer. Be strict and concrete. \
Score the proposal from 0 to 10 on each of: correctness, completeness, quality, \
performance, security. Approve only if it meets the stated thresholds.

Respond with a single JSON object and nothing else:
{
  \"scores\": {\"correctness\": 0, \"completeness\": 0, \"quality\": 0, \"performance\": 0, \"security\": 0},
  \"feedback\": \"overall assessment\",
  \"concerns\": [\"problem\"],
  \"suggestions\": [\"optional improvement\"],
  \"decision\": \"APPROVED | REJECTED | REQUEST_REVISION\",
  \"must_address\": [\"change required before approval\"],
  \"nice_to_have\": [\"optional change\"]
}";

/// Coordinator preamble for classification.
pub const CLASSIFIER_PREAMBLE: &str = "\
You are the coordinator of a team of proposer/reviewer pairs. Decide which pairs \
must work on the task and in which order, list the success criteria and the \
constraints stated by the requester, and estimate complexity.

Respond with a single JSON object and nothing else:
{
  \"task_summary\": \"one sentence\",
  \"execution_order\": [\"pair type\"],
  \"success_criteria\": [\"criterion\"],
  \"constraints\": [\"constraint\"],
  \"complexity\": \"low | medium | high | critical\"
}";

/// Coordinator preamble for conflict arbitration.
pub const ARBITER_PREAMBLE: &str = "\
You are the coordinator and final authority. A proposer and a reviewer could not \
agree within their iteration budget. Rule on the conflict. Your ruling is binding.

Respond with a single JSON object and nothing else:
{
  \"decision\": \"APPROVE_PROPOSER | APPROVE_REVIEWER | COMPROMISE\",
  \"rationale\": \"why\",
  \"binding_instruction\": \"the exact instruction every downstream step must follow\"
}";

/// Persona for a pair type's proposer.
pub fn proposer_persona(pair_type: &str) -> String {
    match pair_type {
        "architecture" => "a tech lead responsible for system design and boundaries".into(),
        "backend" => "a senior backend engineer".into(),
        "frontend" => "a senior frontend engineer focused on usability and accessibility".into(),
        "database" => "a data engineer responsible for schemas, queries and migrations".into(),
        "security" => "a security engineer".into(),
        "qa" => "a QA engineer who writes the test plan and test cases".into(),
        "devops" => "a DevOps engineer responsible for build, deploy and operations".into(),
        "documentation" => "a technical writer".into(),
        other => format!("a senior {} specialist", other),
    }
}

/// Persona for a pair type's reviewer.
pub fn reviewer_persona(pair_type: &str) -> String {
    match pair_type {
        "architecture" => "a principal engineer reviewing designs for coupling and scale".into(),
        "security" => "a security auditor hunting for exploitable weaknesses".into(),
        "qa" => "a QA lead looking for untested paths and weak assertions".into(),
        "frontend" => "a UX critic".into(),
        "database" => "a DBA reviewing integrity, indexing and migration safety".into(),
        other => format!("a critical {} reviewer", other),
    }
}

pub fn proposer_preamble(pair_type: &str) -> String {
    PROPOSER_PREAMBLE.replace("{persona}", &proposer_persona(pair_type))
}

pub fn reviewer_preamble(pair_type: &str) -> String {
    REVIEWER_PREAMBLE.replace("{persona}", &reviewer_persona(pair_type))
}

fn push_list(out: &mut String, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    out.push_str(&format!("\n## {}\n", title));
    for item in items {
        out.push_str(&format!("- {}\n", item));
    }
}

/// Approved results of other pairs, so later pairs build on them.
fn settled_pairs(state: &RunState, except: &str) -> Vec<String> {
    state
        .pair_results()
        .values()
        .filter(|r| r.pair_type.as_str() != except && r.status == PairStatus::Approved)
        .filter_map(|r| {
            r.final_output
                .as_ref()
                .map(|o| format!("{}: {}", r.pair_type, o.rationale))
        })
        .collect()
}

pub fn proposer_prompt(ctx: RoleContext<'_>, prior_feedback: Option<&str>) -> String {
    let pair = ctx.pair.pair_type.as_str();
    let mut out = format!(
        "# Task\n{}\n\n# Your slice\n{} (iteration {} of {})\n",
        ctx.state.original_request, pair, ctx.iteration, ctx.pair.max_iterations
    );
    if let Some(plan) = ctx.state.plan() {
        push_list(&mut out, "Constraints", &plan.constraints);
        push_list(&mut out, "Success criteria", &plan.success_criteria);
    }
    push_list(&mut out, "Approved work from other pairs", &settled_pairs(ctx.state, pair));
    out.push_str(&format!(
        "\nThe reviewer approves at an average of {:.1} with no dimension below {:.1}.\n",
        ctx.pair.approval_threshold, ctx.pair.min_score_threshold
    ));
    if let Some(feedback) = prior_feedback {
        out.push_str("\n# Reviewer feedback on your previous proposal\n");
        out.push_str(feedback);
        out.push('\n');
    }
    if ctx.is_final_iteration() && ctx.iteration > 1 {
        out.push_str("\nThis is your final iteration; unresolved disagreements go to the coordinator.\n");
    }
    out
}

pub fn reviewer_prompt(ctx: RoleContext<'_>, output: &ProposalOutput) -> String {
    let proposal = serde_json::to_string_pretty(&output.content).unwrap_or_default();
    let mut out = format!(
        "# Task\n{}\n\n# Proposal for {} (iteration {} of {})\n## Rationale\n{}\n## Content\n```json\n{}\n```\n",
        ctx.state.original_request,
        ctx.pair.pair_type,
        ctx.iteration,
        ctx.pair.max_iterations,
        output.rationale,
        proposal
    );
    if let Some(diff) = &output.diff_from_previous {
        out.push_str(&format!("## Changes since previous iteration\n{}\n", diff));
    }
    if let Some(plan) = ctx.state.plan() {
        push_list(&mut out, "Constraints", &plan.constraints);
    }
    out.push_str(&format!(
        "\nApprove only if the average score is at least {:.1} and every dimension is at least {:.1}.\n",
        ctx.pair.approval_threshold, ctx.pair.min_score_threshold
    ));
    out
}

pub fn classifier_prompt(state: &RunState, available: &[String]) -> String {
    format!(
        "# Request\n{}\n\n# Available pair types\n{}\n\nOnly use pair types from the list.\n",
        state.original_request,
        available.join(", ")
    )
}

pub fn arbitration_prompt(state: &RunState, conflict: &Conflict) -> String {
    let context = serde_json::to_string_pretty(&conflict.context).unwrap_or_default();
    format!(
        "# Request\n{}\n\n# Conflict in the {} pair after {} iterations\n\
         ## Proposer position\n{}\n\n## Reviewer position\n{}\n\n\
         ## Last scores and thresholds\n```json\n{}\n```\n",
        state.original_request,
        conflict.pair_type,
        conflict.iterations_attempted,
        conflict.proposer_position,
        conflict.reviewer_position,
        context
    )
}
