//! Prompt templates for the analysis and learning flows.
//!
//! Templates are deterministic: the same inputs always produce the same
//! prompt. Every template mandates a strict JSON-only response and spells
//! out the exact keys the decode layer expects.

use crate::pipeline::Candidate;

/// Guidance used when a learn command provides none.
pub const DEFAULT_GUIDANCE: &str = "Analyze the chat context and refine each \
expression's applicable situation so it describes the real usage scenario \
more accurately.";

/// One `- ID n: ...` line per candidate, with weight.
fn candidate_lines(candidates: &[Candidate]) -> String {
    let mut lines = String::new();
    for c in candidates {
        lines.push_str(&format!(
            "- ID {}: situation \"{}\" -> style \"{}\" (weight: {:.2})\n",
            c.id, c.situation, c.style, c.weight
        ));
    }
    lines
}

/// One `- ID n: ...` line per candidate, without weight.
fn candidate_lines_bare(candidates: &[Candidate]) -> String {
    let mut lines = String::new();
    for c in candidates {
        lines.push_str(&format!(
            "- ID {}: situation \"{}\" -> style \"{}\"\n",
            c.id, c.situation, c.style
        ));
    }
    lines
}

/// Prompt for the direct-analysis flow: full used/unused/summary verdict.
pub fn analysis_prompt(message_text: &str, candidates: &[Candidate]) -> String {
    let lines = candidate_lines(candidates);
    format!(
        r#"You are an expression-usage analyst. Decide which of the candidate expressions were actually used when the following message was generated.

Message:
{message_text}

Candidate expressions:
{lines}
Consider whether the message's tone matches an expression's style, whether the scenario matches its situation, and that higher-weight expressions are more likely to have been used.

You must reply with strict JSON in exactly this shape and nothing else:

{{
    "used_expressions": [
        {{
            "id": 123,
            "confidence": 0.85,
            "reason": "why this expression was judged to be used"
        }}
    ],
    "unused_expressions": [
        {{
            "id": 456,
            "reason": "why this expression was judged not to be used"
        }}
    ],
    "summary": "one-line summary of the message's expressive character"
}}

Rules:
1. used_expressions lists the expressions actually used; confidence is in [0, 1].
2. unused_expressions lists the remaining candidates.
3. If no expression was used, used_expressions is an empty array.
4. Reply with JSON only — no other text!"#
    )
}

/// Prompt for learning stage 1: which candidates were actually used.
pub fn usage_prompt(message_text: &str, candidates: &[Candidate]) -> String {
    let lines = candidate_lines_bare(candidates);
    format!(
        r#"You are an expression-usage analyst. Decide which of the candidate expressions were actually used when the following message was generated. An expression counts as used only when its style content is reflected in the message.

Message:
{message_text}

Candidate expressions:
{lines}
You must reply with strict JSON in exactly this shape and nothing else:

{{
    "used_expressions": [
        {{
            "id": 123,
            "reason": "why this expression was judged to be used"
        }}
    ]
}}

Rules:
1. used_expressions lists only the expressions actually used.
2. If no expression was used, used_expressions is an empty array.
3. Reply with JSON only — no other text!"#
    )
}

/// Prompt for learning stage 2: rewrite applicable situations.
pub fn learning_prompt(
    bot_name: &str,
    context_text: &str,
    bot_message_time: &str,
    bot_message_text: &str,
    candidates: &[Candidate],
    guidance: &str,
) -> String {
    let lines = candidate_lines_bare(candidates);
    format!(
        r#"Review the expressions {bot_name} used in a recent message and decide whether their applicable situations should be refined.

Chat context (centered on {bot_name}'s message, with a few messages before and after):
{context_text}

{bot_name}'s message:
time: {bot_message_time}
content: {bot_message_text}

Expressions used in that message:
{lines}
Guidance: {guidance}

Based on the message, the guidance, and the chat context, decide which expressions need a refined situation.

You must reply with strict JSON in exactly this shape and nothing else:

{{
    "expressions": [
        {{
            "id": 123,
            "situation": "current situation",
            "new_situation": "refined situation",
            "reason": "why it was adjusted"
        }}
    ]
}}

Rules:
1. Combine the current situation, the guidance, and the context when refining.
2. Include only expressions that need adjusting; leave good ones out.
3. If nothing needs adjusting, reply {{"expressions": []}}.
4. Only rewrite the situation — never the style content itself.
5. Reply with JSON only — no other text!"#
    )
}
