//! The LLM analysis pipelines.
//!
//! Two flows share the same machinery:
//! - **Direct analysis** (`analyze_message`) — read-only: which expressions
//!   did a given message actually use?
//! - **Learning** (`learn`) — two model stages: filter the candidate set to
//!   the expressions actually used, then rewrite their applicable
//!   situations and apply the revision weight boost.
//!
//! Each stage is terminal on first failure and surfaces its own failure
//! message; nothing is retried. Per-record problems inside the apply step
//! are logged warnings and never abort the batch.

use crate::extract::{parse_lenient, truncate_chars};
use crate::ids::parse_selected_ids;
use crate::prompt;
use crate::report::{
    AnalysisReport, LearnReport, LearnStatus, RecordOutcome, UnusedVerdict, UsedVerdict,
};
use crate::schema::{AnalysisResponse, LearningResponse};
use parlance_core::error::{Error, ModelError, Result};
use parlance_core::expression::{format_epoch, now_epoch};
use parlance_core::history::{FetchOrder, MessageHistory, RenderOptions};
use parlance_core::model::{select_preferred, ModelClient, ModelHandle};
use parlance_core::store::ExpressionStore;
use parlance_core::{weight, ChatMessage};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How long a message excerpt user-facing reports carry.
const EXCERPT_CHARS: usize = 100;

/// The agent's own identity, used to find its messages and to name it in
/// prompts.
#[derive(Debug, Clone)]
pub struct BotIdentity {
    /// Sender id the host stamps on the agent's messages.
    pub id: String,
    /// Display name used in prompts and rendered context.
    pub nickname: String,
}

/// Tunables for the learning flow's context gathering.
#[derive(Debug, Clone)]
pub struct LearnSettings {
    /// History window scanned for the agent's latest message.
    pub history_hours: f64,
    /// Message cap inside that window.
    pub history_limit: u64,
    /// Context messages taken before the agent's message.
    pub context_before: u64,
    /// Context messages taken after it.
    pub context_after: u64,
}

impl Default for LearnSettings {
    fn default() -> Self {
        Self {
            history_hours: 24.0,
            history_limit: 100,
            context_before: 10,
            context_after: 5,
        }
    }
}

/// One expression as the prompts see it. Ids that resolve to nothing in the
/// store keep a placeholder so the model still sees them listed.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: i64,
    pub situation: String,
    pub style: String,
    pub weight: f64,
    pub exists: bool,
}

/// The pipeline: owns the collaborator handles for one configuration.
pub struct AnalysisPipeline {
    store: Arc<dyn ExpressionStore>,
    history: Arc<dyn MessageHistory>,
    models: Arc<dyn ModelClient>,
    bot: BotIdentity,
    settings: LearnSettings,
}

impl AnalysisPipeline {
    pub fn new(
        store: Arc<dyn ExpressionStore>,
        history: Arc<dyn MessageHistory>,
        models: Arc<dyn ModelClient>,
        bot: BotIdentity,
    ) -> Self {
        Self {
            store,
            history,
            models,
            bot,
            settings: LearnSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: LearnSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Load candidate details for a set of ids, keeping placeholders for
    /// ids with no stored record.
    async fn load_candidates(&self, ids: &[i64]) -> Result<Vec<Candidate>> {
        let mut candidates = Vec::with_capacity(ids.len());
        for &id in ids {
            match self.store.get(id).await? {
                Some(expr) => candidates.push(Candidate {
                    id,
                    situation: expr.situation,
                    style: expr.style,
                    weight: expr.weight,
                    exists: true,
                }),
                None => candidates.push(Candidate {
                    id,
                    situation: "unknown".into(),
                    style: "(expression missing)".into(),
                    weight: 0.0,
                    exists: false,
                }),
            }
        }
        Ok(candidates)
    }

    /// Pick a handle from the available pool, preferring `utils` then
    /// `chat`.
    async fn pick_model(&self) -> Result<ModelHandle> {
        let models = self.models.available_models().await;
        select_preferred(&models)
            .cloned()
            .ok_or(Error::Model(ModelError::NoModelAvailable))
    }

    /// Analyze which expressions a stored message actually used.
    /// Read-only: no store writes happen in this flow.
    pub async fn analyze_message(&self, message_id: &str) -> Result<AnalysisReport> {
        let message = self
            .history
            .message_by_id(message_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("message {message_id}")))?;
        if message.text.trim().is_empty() {
            return Err(Error::NotFound(format!(
                "message {message_id} has no text content"
            )));
        }

        let excerpt = truncate_chars(&message.text, EXCERPT_CHARS);
        let ids = parse_selected_ids(message.selected_expressions.as_deref().unwrap_or(""));
        if ids.is_empty() {
            debug!(message_id, "message has no usable expression ids");
            return Ok(AnalysisReport::nothing(message_id, excerpt));
        }

        let candidates = self.load_candidates(&ids).await?;
        let handle = self.pick_model().await?;
        let generation = self
            .models
            .generate(
                &prompt::analysis_prompt(&message.text, &candidates),
                &handle,
                "expression_analysis",
            )
            .await?;
        debug!(model = %generation.model_name, message_id, "analysis response received");

        let parsed: AnalysisResponse = parse_lenient(&generation.text)?;

        let used = parsed
            .used_expressions
            .iter()
            .filter_map(|entry| {
                let id = entry.id?;
                let candidate = candidates.iter().find(|c| c.id == id);
                Some(UsedVerdict {
                    id,
                    situation: candidate.map(|c| c.situation.clone()).unwrap_or_default(),
                    style: candidate.map(|c| c.style.clone()).unwrap_or_default(),
                    exists: candidate.is_some_and(|c| c.exists),
                    confidence: entry.confidence,
                    reason: entry
                        .reason
                        .clone()
                        .unwrap_or_else(|| "no reason given".into()),
                })
            })
            .collect();

        let unused = parsed
            .unused_expressions
            .iter()
            .filter_map(|entry| {
                Some(UnusedVerdict {
                    id: entry.id?,
                    reason: entry
                        .reason
                        .clone()
                        .unwrap_or_else(|| "no reason given".into()),
                })
            })
            .collect();

        Ok(AnalysisReport {
            message_id: message_id.into(),
            message_excerpt: excerpt,
            model_name: Some(generation.model_name),
            used,
            unused,
            summary: parsed.summary,
            nothing_to_analyze: false,
        })
    }

    /// Run the learning flow for a chat.
    pub async fn learn(&self, chat_id: &str, guidance: Option<&str>) -> Result<LearnReport> {
        let guidance = guidance
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .unwrap_or(prompt::DEFAULT_GUIDANCE)
            .to_string();

        // The agent's latest message inside the history window.
        let recent = self
            .history
            .recent_messages(
                chat_id,
                self.settings.history_hours,
                self.settings.history_limit,
                FetchOrder::Latest,
                true,
            )
            .await?;
        let bot_message = recent
            .iter()
            .rev()
            .find(|m| m.sender_id == self.bot.id)
            .cloned()
            .ok_or_else(|| {
                Error::NotFound(format!("no recent message from {}", self.bot.nickname))
            })?;
        if bot_message.text.trim().is_empty() {
            return Err(Error::NotFound(format!(
                "the latest message from {} has no text content",
                self.bot.nickname
            )));
        }

        let excerpt = truncate_chars(&bot_message.text, EXCERPT_CHARS);
        let ids = parse_selected_ids(bot_message.selected_expressions.as_deref().unwrap_or(""));
        if ids.is_empty() {
            debug!(chat_id, "latest agent message has no usable expression ids");
            return Ok(LearnReport {
                status: LearnStatus::NoExpressions,
                guidance,
                model_name: None,
                message_excerpt: excerpt,
                outcomes: Vec::new(),
                candidates: Vec::new(),
            });
        }
        let candidates = self.load_candidates(&ids).await?;

        // Stage 1 — which candidates were actually used.
        let handle = self.pick_model().await?;
        let usage_generation = self
            .models
            .generate(
                &prompt::usage_prompt(&bot_message.text, &candidates),
                &handle,
                "expression_analysis",
            )
            .await?;
        let usage: AnalysisResponse = parse_lenient(&usage_generation.text)?;
        let used_ids: HashSet<i64> = usage
            .used_expressions
            .iter()
            .filter_map(|entry| entry.id)
            .collect();
        let used_candidates: Vec<Candidate> = candidates
            .iter()
            .filter(|c| c.exists && used_ids.contains(&c.id))
            .cloned()
            .collect();
        info!(
            chat_id,
            candidates = candidates.len(),
            used = used_candidates.len(),
            "usage analysis complete"
        );
        if used_candidates.is_empty() {
            return Ok(LearnReport {
                status: LearnStatus::NoneUsed,
                guidance,
                model_name: Some(usage_generation.model_name),
                message_excerpt: excerpt,
                outcomes: Vec::new(),
                candidates,
            });
        }

        // Stage 2 — context window + situation refinement.
        let context_text = self.gather_context(chat_id, &bot_message).await?;
        let handle = self.pick_model().await?;
        let generation = self
            .models
            .generate(
                &prompt::learning_prompt(
                    &self.bot.nickname,
                    &context_text,
                    &format_epoch(bot_message.timestamp),
                    &bot_message.text,
                    &used_candidates,
                    &guidance,
                ),
                &handle,
                "expression_learning",
            )
            .await?;
        debug!(model = %generation.model_name, chat_id, "learning response received");

        let parsed: LearningResponse = parse_lenient(&generation.text)?;
        let outcomes = self.apply_learning(&parsed).await;

        Ok(LearnReport {
            status: LearnStatus::Completed,
            guidance,
            model_name: Some(generation.model_name),
            message_excerpt: excerpt,
            outcomes,
            candidates: used_candidates,
        })
    }

    /// Build the readable context window around the agent's message.
    async fn gather_context(&self, chat_id: &str, bot_message: &ChatMessage) -> Result<String> {
        let before = self
            .history
            .messages_before(
                chat_id,
                bot_message.timestamp,
                self.settings.context_before,
                true,
            )
            .await?;
        let after = self
            .history
            .messages_between(
                chat_id,
                bot_message.timestamp,
                now_epoch(),
                self.settings.context_after,
                FetchOrder::Earliest,
                true,
            )
            .await?;

        let mut window = before;
        window.push(bot_message.clone());
        window.extend(after);

        Ok(parlance_core::history::render_readable(
            &window,
            &RenderOptions {
                bot_id: Some(self.bot.id.clone()),
                bot_name: Some(self.bot.nickname.clone()),
            },
        ))
    }

    /// Apply a learning response to the store, best-effort per record.
    ///
    /// Returns one outcome per considered entry; entries with unusable or
    /// unknown ids are skipped with a warning and do not appear.
    async fn apply_learning(&self, response: &LearningResponse) -> Vec<RecordOutcome> {
        let mut outcomes = Vec::with_capacity(response.expressions.len());

        for entry in &response.expressions {
            let Some(id) = entry.id else {
                warn!("learning entry without a usable id, skipping");
                continue;
            };
            let expr = match self.store.get(id).await {
                Ok(Some(expr)) => expr,
                Ok(None) => {
                    warn!(id, "expression does not exist, skipping");
                    continue;
                }
                Err(e) => {
                    warn!(id, error = %e, "expression lookup failed, skipping");
                    continue;
                }
            };
            let reason = entry
                .reason
                .clone()
                .unwrap_or_else(|| "no reason given".into());

            let proposed = entry
                .new_situation
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty());

            match proposed {
                Some(new_situation) if new_situation != expr.situation => {
                    let mut revised = expr.clone();
                    revised.situation = new_situation.to_string();
                    revised.weight = weight::revision_boost(revised.weight);
                    revised.touch();
                    match self.store.save(&revised).await {
                        Ok(()) => {
                            info!(
                                id,
                                old = %expr.situation,
                                new = %revised.situation,
                                weight = revised.weight,
                                "expression situation refined"
                            );
                            outcomes.push(RecordOutcome {
                                id,
                                old_situation: expr.situation,
                                new_situation: Some(revised.situation),
                                style: expr.style,
                                reason,
                                weight: revised.weight,
                                updated: true,
                            });
                        }
                        Err(e) => {
                            warn!(id, error = %e, "save failed, record left unchanged");
                            outcomes.push(RecordOutcome {
                                id,
                                old_situation: expr.situation,
                                new_situation: None,
                                style: expr.style,
                                reason,
                                weight: expr.weight,
                                updated: false,
                            });
                        }
                    }
                }
                _ => {
                    // Considered but not updated: either no new_situation or
                    // the proposal equals the stored text (no boost then).
                    outcomes.push(RecordOutcome {
                        id,
                        old_situation: expr.situation,
                        new_situation: None,
                        style: expr.style,
                        reason,
                        weight: expr.weight,
                        updated: false,
                    });
                }
            }
        }

        outcomes
    }
}
