//! Prompt builders for each remote role.
//!
//! The reply formats requested here are the ones the parsers in
//! [`crate::producers`], [`crate::advisor`] and `arbiter::verdict` accept.

use arbiter::{AdvisorBrief, EscalationTier, GenerationRequest};

use crate::llm::ChatMessage;

fn tier_guidance(tier: EscalationTier) -> &'static str {
    match tier {
        EscalationTier::Basic => "Write straightforward SQL that answers the question directly.",
        EscalationTier::Advanced => {
            "Reason about joins, NULL handling and aggregation granularity before writing SQL. \
             Earlier attempts at this question failed validation."
        }
        EscalationTier::Expert => {
            "You are the last line of escalation. Check every column reference against the schema, \
             respect every piece of evidence, and prefer the simplest correct query."
        }
    }
}

pub fn candidate_messages(request: &GenerationRequest<'_>, count: usize) -> Vec<ChatMessage> {
    let system = format!(
        "You translate questions into SQL for the schema provided. {}\n\
         Return exactly {count} alternative queries, each in its own ```sql fenced block. \
         No other code blocks.",
        tier_guidance(request.tier)
    );

    let mut user = format!(
        "## Schema\n\n{}\n\n## Question\n\n{}\n",
        request.schema_context, request.question
    );
    if !request.evidence.trim().is_empty() {
        user.push_str(&format!("\n## Evidence\n\n{}\n", request.evidence));
    }
    if let Some(ctx) = request.escalation {
        user.push_str(&format!(
            "\n## Previous attempt ({})\n\n{}\n",
            ctx.originating_tier, ctx.failure_analysis
        ));
        for sql in &ctx.failed_candidates {
            user.push_str(&format!("\nRejected:\n```sql\n{}\n```\n", sql.trim()));
        }
    }

    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

pub fn test_messages(request: &GenerationRequest<'_>) -> Vec<ChatMessage> {
    let system = format!(
        "You write acceptance checks for SQL answers. Produce {} short, independent, \
         natural-language assertions that a correct query's result must satisfy. \
         One per line, numbered `1.`, `2.`, ... Prefix an assertion with \
         [EVIDENCE-CRITICAL] when it restates a piece of the evidence.",
        request.test_count
    );
    let mut user = format!(
        "## Schema\n\n{}\n\n## Question\n\n{}\n",
        request.schema_context, request.question
    );
    if !request.evidence.trim().is_empty() {
        user.push_str(&format!("\n## Evidence\n\n{}\n", request.evidence));
    }
    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

pub fn judge_messages(sql: &str, tests: &[String]) -> Vec<ChatMessage> {
    let system = "You check one SQL query against numbered assertions. Answer with a single line:\n\
                  SQL #1: <v1>, <v2>, ...\n\
                  with exactly one verdict per assertion, in order. A verdict is OK, or \
                  KO - <short reason>.";
    let mut user = format!("## Query\n\n```sql\n{}\n```\n\n## Assertions\n\n", sql.trim());
    for (i, test) in tests.iter().enumerate() {
        user.push_str(&format!("{}. {}\n", i + 1, test));
    }
    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

pub fn advisor_messages(brief: &AdvisorBrief) -> Vec<ChatMessage> {
    let system = "Several SQL candidates scored the same against the validation checks. \
                  Pick the one most likely to answer the question correctly. Reply with:\n\
                  CHOICE: <candidate number>\n\
                  RATIONALE: <one paragraph>";
    let user = format!(
        "## Question\n\n{}\n\n## Schema\n\n{}\n\n## Candidates\n\n{}\n## Failed checks\n\n{}",
        brief.question, brief.schema_context, brief.candidate_list, brief.failure_detail
    );
    vec![ChatMessage::system(system), ChatMessage::user(user)]
}
