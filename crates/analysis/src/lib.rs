//! # Parlance Analysis
//!
//! The LLM-assisted analysis and refinement pipelines: parse the expression
//! ids stamped on bot messages, prompt a model for usage/refinement verdicts,
//! recover structure from its untrusted JSON response, and apply the
//! resulting mutations record by record.

pub mod extract;
pub mod ids;
pub mod pipeline;
pub mod prompt;
pub mod report;
pub mod schema;

pub use pipeline::{AnalysisPipeline, BotIdentity, Candidate, LearnSettings};
pub use report::{
    render_analysis, render_learn, AnalysisReport, LearnReport, LearnStatus, RecordOutcome,
};
