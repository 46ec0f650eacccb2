//! Report types the pipelines return, and their text rendering.
//!
//! The mutation step hands back an explicit list of per-record outcomes;
//! rendering consumes that list directly so no state hides between the
//! apply and format steps.

use crate::pipeline::Candidate;

/// Verdict for one candidate the model says was used.
#[derive(Debug, Clone)]
pub struct UsedVerdict {
    pub id: i64,
    pub situation: String,
    pub style: String,
    /// False when the id in the response has no stored record.
    pub exists: bool,
    pub confidence: Option<f64>,
    pub reason: String,
}

/// Verdict for one candidate the model says was not used.
#[derive(Debug, Clone)]
pub struct UnusedVerdict {
    pub id: i64,
    pub reason: String,
}

/// Result of the direct-analysis flow. Read-only — nothing was mutated.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub message_id: String,
    pub message_excerpt: String,
    pub model_name: Option<String>,
    pub used: Vec<UsedVerdict>,
    pub unused: Vec<UnusedVerdict>,
    pub summary: Option<String>,
    /// True when the message carried no usable expression ids.
    pub nothing_to_analyze: bool,
}

impl AnalysisReport {
    /// The short-circuit result for a message with no expression ids.
    pub fn nothing(message_id: impl Into<String>, message_excerpt: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            message_excerpt: message_excerpt.into(),
            model_name: None,
            used: Vec::new(),
            unused: Vec::new(),
            summary: None,
            nothing_to_analyze: true,
        }
    }
}

/// How far a learning run got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearnStatus {
    /// The bot's latest message carried no expression ids.
    NoExpressions,
    /// The usage check concluded no candidate was actually used.
    NoneUsed,
    /// The refinement stage ran; see the outcomes.
    Completed,
}

/// Outcome of considering one response entry against the store.
#[derive(Debug, Clone)]
pub struct RecordOutcome {
    pub id: i64,
    pub old_situation: String,
    /// Set only when the situation was actually rewritten.
    pub new_situation: Option<String>,
    pub style: String,
    pub reason: String,
    /// The record's weight after the run.
    pub weight: f64,
    pub updated: bool,
}

/// Result of the learning flow.
#[derive(Debug, Clone)]
pub struct LearnReport {
    pub status: LearnStatus,
    pub guidance: String,
    pub model_name: Option<String>,
    /// Excerpt of the bot message the run was centered on.
    pub message_excerpt: String,
    /// Per-record outcomes of the refinement stage (empty unless Completed).
    pub outcomes: Vec<RecordOutcome>,
    /// The candidates relevant to this run, for no-update display.
    pub candidates: Vec<Candidate>,
}

impl LearnReport {
    pub fn updated_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.updated).count()
    }
}

/// Render an analysis report for user display.
pub fn render_analysis(report: &AnalysisReport) -> String {
    if report.nothing_to_analyze {
        return format!(
            "Message {} has no associated expressions\nContent: {}",
            report.message_id, report.message_excerpt
        );
    }

    let mut out = format!(
        "Message {}\nContent: {}\n\n",
        report.message_id, report.message_excerpt
    );

    if report.used.is_empty() {
        out.push_str("Used expressions: none\n");
    } else {
        out.push_str("Used expressions:\n");
        for verdict in &report.used {
            if verdict.exists {
                out.push_str(&format!(
                    "• ID {}: {} -> {}\n",
                    verdict.id, verdict.situation, verdict.style
                ));
            } else {
                out.push_str(&format!("• ID {}: expression missing\n", verdict.id));
            }
            out.push_str(&format!("  reason: {}\n", verdict.reason));
        }
    }

    if !report.unused.is_empty() {
        out.push_str("\nUnused expressions:\n");
        for verdict in &report.unused {
            out.push_str(&format!("• ID {}: {}\n", verdict.id, verdict.reason));
        }
    }

    if let Some(summary) = &report.summary {
        out.push_str(&format!("\nSummary: {summary}"));
    }

    out.trim_end().to_string()
}

/// Render a learning report for user display.
pub fn render_learn(report: &LearnReport) -> String {
    match report.status {
        LearnStatus::NoExpressions => format!(
            "The latest agent message has no associated expressions\nContent: {}",
            report.message_excerpt
        ),
        LearnStatus::NoneUsed => format!(
            "Analysis found no expressions actually used in the latest agent message\nContent: {}",
            report.message_excerpt
        ),
        LearnStatus::Completed => {
            let model = report.model_name.as_deref().unwrap_or("unknown");
            let updated = report.updated_count();
            if updated > 0 {
                let mut out = format!(
                    "Learning complete! Model {model} updated {updated} expression(s)\n\nGuidance: {}\n\nDetails:\n",
                    report.guidance
                );
                for outcome in &report.outcomes {
                    out.push_str(&render_outcome(outcome));
                }
                out.trim_end().to_string()
            } else {
                let mut out = format!(
                    "Learning complete! Model {model} found nothing to update\n\nGuidance: {}\n\nLatest agent message: {}\n\nExpressions considered:\n",
                    report.guidance, report.message_excerpt
                );
                for c in &report.candidates {
                    out.push_str(&format!(
                        "• ID {}:\n  style: {}\n  situation: {}\n  weight: {:.2}\n",
                        c.id, c.style, c.situation, c.weight
                    ));
                }
                out.trim_end().to_string()
            }
        }
    }
}

fn render_outcome(outcome: &RecordOutcome) -> String {
    match &outcome.new_situation {
        Some(new_situation) => format!(
            "• ID {}:\n  style: {}\n  old situation: {}\n  new situation: {}\n  reason: {}\n  weight: {:.2}\n",
            outcome.id,
            outcome.style,
            outcome.old_situation,
            new_situation,
            outcome.reason,
            outcome.weight
        ),
        None => format!(
            "• ID {}:\n  style: {}\n  situation: {}\n  reason: {}\n",
            outcome.id, outcome.style, outcome.old_situation, outcome.reason
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: i64) -> Candidate {
        Candidate {
            id,
            situation: "感叹".into(),
            style: "哇塞".into(),
            weight: 2.0,
            exists: true,
        }
    }

    #[test]
    fn analysis_render_includes_verdicts() {
        let report = AnalysisReport {
            message_id: "m1".into(),
            message_excerpt: "哇塞，居然".into(),
            model_name: Some("gpt-4o-mini".into()),
            used: vec![UsedVerdict {
                id: 5,
                situation: "感叹".into(),
                style: "哇塞".into(),
                exists: true,
                confidence: Some(0.9),
                reason: "tone matches".into(),
            }],
            unused: vec![UnusedVerdict {
                id: 7,
                reason: "not reflected".into(),
            }],
            summary: Some("exclamatory".into()),
            nothing_to_analyze: false,
        };
        let text = render_analysis(&report);
        assert!(text.contains("Message m1"));
        assert!(text.contains("• ID 5: 感叹 -> 哇塞"));
        assert!(text.contains("reason: tone matches"));
        assert!(text.contains("• ID 7: not reflected"));
        assert!(text.contains("Summary: exclamatory"));
    }

    #[test]
    fn analysis_render_missing_expression() {
        let report = AnalysisReport {
            message_id: "m1".into(),
            message_excerpt: "x".into(),
            model_name: None,
            used: vec![UsedVerdict {
                id: 99,
                situation: String::new(),
                style: String::new(),
                exists: false,
                confidence: None,
                reason: "r".into(),
            }],
            unused: vec![],
            summary: None,
            nothing_to_analyze: false,
        };
        assert!(render_analysis(&report).contains("• ID 99: expression missing"));
    }

    #[test]
    fn learn_render_updated_details() {
        let report = LearnReport {
            status: LearnStatus::Completed,
            guidance: "be softer".into(),
            model_name: Some("m1".into()),
            message_excerpt: "对不起啦".into(),
            outcomes: vec![RecordOutcome {
                id: 5,
                old_situation: "道歉".into(),
                new_situation: Some("道歉语境".into()),
                style: "对不起啦".into(),
                reason: "语气更软".into(),
                weight: 1.5,
                updated: true,
            }],
            candidates: vec![candidate(5)],
        };
        let text = render_learn(&report);
        assert!(text.contains("updated 1 expression"));
        assert!(text.contains("old situation: 道歉"));
        assert!(text.contains("new situation: 道歉语境"));
        assert!(text.contains("weight: 1.50"));
    }

    #[test]
    fn learn_render_nothing_updated_lists_candidates() {
        let report = LearnReport {
            status: LearnStatus::Completed,
            guidance: "g".into(),
            model_name: Some("m1".into()),
            message_excerpt: "hello".into(),
            outcomes: vec![],
            candidates: vec![candidate(3)],
        };
        let text = render_learn(&report);
        assert!(text.contains("nothing to update"));
        assert!(text.contains("• ID 3:"));
    }

    #[test]
    fn learn_render_short_circuits() {
        let report = LearnReport {
            status: LearnStatus::NoExpressions,
            guidance: "g".into(),
            model_name: None,
            message_excerpt: "plain".into(),
            outcomes: vec![],
            candidates: vec![],
        };
        assert!(render_learn(&report).contains("no associated expressions"));
    }
}
