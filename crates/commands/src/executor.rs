//! Command execution.
//!
//! [`CommandExecutor`] turns one line of user text into one
//! [`CommandReply`]: parse → resolve the target chat → run the operation.
//! Direct commands (add/list/del/adjust/review) run against the store and
//! history; learning commands delegate to the analysis pipeline.
//!
//! Failures never escape as errors — every path folds into the tri-state
//! reply so the caller can hand the text straight to the chat.

use crate::parser::{self, Command, CommandParser};
use crate::resolver::resolve_chat_ref;
use parlance_analysis::extract::truncate_chars;
use parlance_analysis::ids::parse_selected_ids;
use parlance_analysis::{
    render_analysis, render_learn, AnalysisPipeline, BotIdentity, LearnSettings,
};
use parlance_core::error::{Error, Result};
use parlance_core::expression::format_epoch;
use parlance_core::history::FetchOrder;
use parlance_core::model::ModelClient;
use parlance_core::store::ExpressionStore;
use parlance_core::weight::{self, DeltaOutcome};
use parlance_core::{ChatId, CommandReply, MessageHistory, NewExpression};
use std::sync::Arc;
use tracing::info;

/// How much history the review command scans.
#[derive(Debug, Clone)]
pub struct ReviewSettings {
    pub hours: f64,
    pub limit: u64,
}

impl Default for ReviewSettings {
    fn default() -> Self {
        Self {
            hours: 24.0,
            limit: 15,
        }
    }
}

/// Where a command was issued from.
#[derive(Debug, Clone, Default)]
pub struct CommandContext {
    /// The invoking chat, used as the fallback target.
    pub chat_id: Option<ChatId>,
    /// The invoking user, for logs.
    pub sender_id: Option<String>,
}

/// Executes parsed commands against the collaborators.
pub struct CommandExecutor {
    store: Arc<dyn ExpressionStore>,
    history: Arc<dyn MessageHistory>,
    pipeline: AnalysisPipeline,
    parser: CommandParser,
    bot: BotIdentity,
    review: ReviewSettings,
}

impl CommandExecutor {
    pub fn new(
        store: Arc<dyn ExpressionStore>,
        history: Arc<dyn MessageHistory>,
        models: Arc<dyn ModelClient>,
        bot: BotIdentity,
    ) -> Self {
        let pipeline =
            AnalysisPipeline::new(store.clone(), history.clone(), models, bot.clone());
        Self {
            store,
            history,
            pipeline,
            parser: CommandParser::new(),
            bot,
            review: ReviewSettings::default(),
        }
    }

    pub fn with_learn_settings(mut self, settings: LearnSettings) -> Self {
        self.pipeline = self.pipeline.with_settings(settings);
        self
    }

    pub fn with_review_settings(mut self, settings: ReviewSettings) -> Self {
        self.review = settings;
        self
    }

    /// Run one line of command text to completion.
    pub async fn execute(&self, text: &str, ctx: &CommandContext) -> CommandReply {
        let Some(command) = self.parser.parse(text) else {
            return CommandReply::fail(parser::usage_for(text));
        };
        info!(
            command = ?command,
            sender = ctx.sender_id.as_deref().unwrap_or("<unknown>"),
            "executing command"
        );

        let result = match command {
            Command::Add {
                situation,
                style,
                chat_ref,
                weight,
            } => self.add(situation, style, chat_ref, weight, ctx).await,
            Command::List {
                chat_ref,
                page,
                size,
            } => self.list(chat_ref, page, size, ctx).await,
            Command::Delete { id, chat_ref } => self.delete(id, chat_ref, ctx).await,
            Command::Adjust {
                id,
                delta,
                chat_ref,
            } => self.adjust(id, delta, chat_ref, ctx).await,
            Command::Review => self.review(ctx).await,
            Command::Learn { guidance } => self.learn(guidance, ctx).await,
            Command::Analyze { message_id } => self.analyze(&message_id).await,
        };

        result.unwrap_or_else(|e| CommandReply::fail(e.to_string()))
    }

    async fn add(
        &self,
        situation: String,
        style: String,
        chat_ref: Option<String>,
        weight: f64,
        ctx: &CommandContext,
    ) -> Result<CommandReply> {
        let chat = resolve_chat_ref(chat_ref.as_deref(), ctx.chat_id.as_ref())?;

        // (chat, situation, style) is a soft-duplicate key: re-check before
        // insert so re-adding boosts instead of forking the record.
        match self
            .store
            .find_exact(chat.as_str(), &situation, &style)
            .await?
        {
            Some(mut existing) => {
                existing.weight = weight::duplicate_boost(existing.weight);
                existing.touch();
                self.store.save(&existing).await?;
                info!(id = existing.id, weight = existing.weight, "duplicate add boosted");
                Ok(CommandReply::ok(format!(
                    "expression already exists, weight raised to {:.2}",
                    existing.weight
                )))
            }
            None => {
                let created = self
                    .store
                    .create(NewExpression {
                        chat_id: chat.0,
                        situation,
                        style,
                        weight,
                    })
                    .await?;
                Ok(CommandReply::ok(format!("added expression id={}", created.id)))
            }
        }
    }

    async fn list(
        &self,
        chat_ref: Option<String>,
        page: u64,
        size: u64,
        ctx: &CommandContext,
    ) -> Result<CommandReply> {
        let chat = resolve_chat_ref(chat_ref.as_deref(), ctx.chat_id.as_ref())?;
        let page = self.store.page_by_chat(chat.as_str(), page, size).await?;

        let mut lines = vec![format!(
            "共{}条，页{}/{}",
            page.total, page.page, page.page_count
        )];
        for expr in &page.rows {
            lines.push(format!(
                "id={} {} -> {} | w={:.2} | at={}",
                expr.id,
                expr.situation,
                expr.style,
                expr.weight,
                format_epoch(expr.last_active_time)
            ));
        }
        if page.rows.is_empty() {
            lines.push("（无数据）".into());
        }

        Ok(CommandReply::ok(lines.join("\n")).with_record(false))
    }

    async fn delete(
        &self,
        id: i64,
        chat_ref: Option<String>,
        ctx: &CommandContext,
    ) -> Result<CommandReply> {
        // The chat is resolved for addressability like every other form,
        // but ids are globally unique so deletion is not chat-scoped.
        let _chat = resolve_chat_ref(chat_ref.as_deref(), ctx.chat_id.as_ref())?;

        if self.store.delete(id).await? {
            Ok(CommandReply::ok(format!("deleted id={id}")))
        } else {
            Ok(CommandReply::fail(format!("no expression with id {id}")))
        }
    }

    async fn adjust(
        &self,
        id: i64,
        delta: f64,
        chat_ref: Option<String>,
        ctx: &CommandContext,
    ) -> Result<CommandReply> {
        let chat = resolve_chat_ref(chat_ref.as_deref(), ctx.chat_id.as_ref())?;

        let Some(mut expr) = self.store.get(id).await? else {
            return Ok(CommandReply::fail(format!(
                "no expression with id {id} in the target chat"
            )));
        };
        if expr.chat_id != chat.as_str() {
            return Ok(CommandReply::fail(format!(
                "no expression with id {id} in the target chat"
            )));
        }

        match weight::apply_delta(expr.weight, delta) {
            DeltaOutcome::Delete => {
                self.store.delete(id).await?;
                info!(id, delta, "weight exhausted, expression deleted");
                Ok(CommandReply::ok(format!(
                    "weight fell to {:.2}, expression deleted",
                    expr.weight + delta
                )))
            }
            DeltaOutcome::Update(weight) => {
                expr.weight = weight;
                expr.touch();
                self.store.save(&expr).await?;
                Ok(CommandReply::ok(format!(
                    "updated weight of id={id} to {weight:.2}"
                )))
            }
        }
    }

    async fn review(&self, ctx: &CommandContext) -> Result<CommandReply> {
        let chat = ctx
            .chat_id
            .as_ref()
            .ok_or_else(|| Error::Resolution("run review inside a chat".into()))?;

        let recent = self
            .history
            .recent_messages(
                chat.as_str(),
                self.review.hours,
                self.review.limit,
                FetchOrder::Latest,
                true,
            )
            .await?;
        let bot_messages: Vec<_> = recent
            .iter()
            .filter(|m| m.sender_id == self.bot.id)
            .collect();
        if bot_messages.is_empty() {
            return Ok(CommandReply::ok(format!(
                "no messages from {} among the latest {}",
                self.bot.nickname, self.review.limit
            ))
            .with_record(false));
        }

        let mut sections = Vec::new();
        for msg in bot_messages {
            let Some(raw) = msg
                .selected_expressions
                .as_deref()
                .filter(|s| !s.trim().is_empty())
            else {
                continue;
            };

            let mut lines = vec![format!(
                "message [{}]: {}",
                msg.message_id,
                truncate_chars(&msg.text, 50)
            )];
            let ids = parse_selected_ids(raw);
            if ids.is_empty() {
                lines.push(format!("used expressions: {raw} (no parseable ids)"));
            } else {
                lines.push("used expressions:".into());
                for id in ids {
                    match self.store.get(id).await? {
                        Some(expr) => lines.push(format!(
                            "  ID {}: {} -> {} (weight: {:.2})",
                            id, expr.situation, expr.style, expr.weight
                        )),
                        None => lines.push(format!("  ID {id}: expression missing")),
                    }
                }
            }
            sections.push(lines.join("\n"));
        }

        if sections.is_empty() {
            return Ok(
                CommandReply::ok("no expression usage records found").with_record(false)
            );
        }
        Ok(CommandReply::ok(sections.join("\n---\n")).with_record(false))
    }

    async fn learn(
        &self,
        guidance: Option<String>,
        ctx: &CommandContext,
    ) -> Result<CommandReply> {
        let chat = ctx
            .chat_id
            .as_ref()
            .ok_or_else(|| Error::Resolution("run learn inside a chat".into()))?;
        let report = self.pipeline.learn(chat.as_str(), guidance.as_deref()).await?;
        Ok(CommandReply::ok(render_learn(&report)).with_record(false))
    }

    async fn analyze(&self, message_id: &str) -> Result<CommandReply> {
        let report = self.pipeline.analyze_message(message_id).await?;
        Ok(CommandReply::ok(render_analysis(&report)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parlance_core::error::ModelError;
    use parlance_core::expression::now_epoch;
    use parlance_core::history::ChatMessage;
    use parlance_core::model::{Generation, ModelHandle};
    use parlance_store::InMemoryStore;
    use std::collections::{HashMap, VecDeque};
    use tokio::sync::Mutex;

    const CHAT: &str = "0123456789abcdef0123456789abcdef";
    const BOT: &str = "bot-1";

    /// A client with no models at all.
    struct NullModels;

    #[async_trait]
    impl ModelClient for NullModels {
        fn name(&self) -> &str {
            "null"
        }

        async fn available_models(&self) -> HashMap<String, ModelHandle> {
            HashMap::new()
        }

        async fn generate(
            &self,
            _prompt: &str,
            _handle: &ModelHandle,
            _request_tag: &str,
        ) -> std::result::Result<Generation, ModelError> {
            Err(ModelError::NoModelAvailable)
        }
    }

    /// Replays scripted responses in order.
    struct ScriptedModels {
        responses: Mutex<VecDeque<String>>,
    }

    impl ScriptedModels {
        fn new(responses: &[String]) -> Self {
            Self {
                responses: Mutex::new(responses.iter().cloned().collect()),
            }
        }
    }

    #[async_trait]
    impl ModelClient for ScriptedModels {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn available_models(&self) -> HashMap<String, ModelHandle> {
            HashMap::from([(
                "utils".to_string(),
                ModelHandle {
                    role: "utils".into(),
                    model: "scripted-utils".into(),
                },
            )])
        }

        async fn generate(
            &self,
            _prompt: &str,
            handle: &ModelHandle,
            _request_tag: &str,
        ) -> std::result::Result<Generation, ModelError> {
            let text = self
                .responses
                .lock()
                .await
                .pop_front()
                .expect("scripted models ran out of responses");
            Ok(Generation {
                text,
                reasoning: None,
                model_name: handle.model.clone(),
            })
        }
    }

    fn bot() -> BotIdentity {
        BotIdentity {
            id: BOT.into(),
            nickname: "Mai".into(),
        }
    }

    fn executor_with(
        store: Arc<InMemoryStore>,
        models: Arc<dyn ModelClient>,
    ) -> CommandExecutor {
        CommandExecutor::new(store.clone(), store, models, bot())
    }

    fn executor(store: Arc<InMemoryStore>) -> CommandExecutor {
        executor_with(store, Arc::new(NullModels))
    }

    fn in_chat() -> CommandContext {
        CommandContext {
            chat_id: Some(ChatId::new(CHAT)),
            sender_id: Some("tester".into()),
        }
    }

    #[tokio::test]
    async fn add_creates_then_duplicate_boosts() {
        let store = Arc::new(InMemoryStore::new());
        let exec = executor(store.clone());

        let reply = exec.execute("/expr add 感叹 哇塞 w=2.0", &in_chat()).await;
        assert!(reply.ok, "{}", reply.text);

        let page = store.page_by_chat(CHAT, 1, 10).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.rows[0].weight, 2.0);

        // Re-adding the identical triple boosts instead of creating.
        let reply = exec.execute("/expr add 感叹 哇塞", &in_chat()).await;
        assert!(reply.ok);
        assert!(reply.text.contains("2.10"));

        let page = store.page_by_chat(CHAT, 1, 10).await.unwrap();
        assert_eq!(page.total, 1);
        assert!((page.rows[0].weight - 2.1).abs() < 1e-9);
    }

    #[tokio::test]
    async fn add_near_duplicate_creates_second_record() {
        let store = Arc::new(InMemoryStore::new());
        let exec = executor(store.clone());

        exec.execute("/expr add 感叹 哇塞", &in_chat()).await;
        exec.execute("/expr add 感叹 哇塞！", &in_chat()).await;

        let page = store.page_by_chat(CHAT, 1, 10).await.unwrap();
        assert_eq!(page.total, 2);
    }

    #[tokio::test]
    async fn add_without_chat_context_fails() {
        let exec = executor(Arc::new(InMemoryStore::new()));
        let reply = exec
            .execute("/expr add a b", &CommandContext::default())
            .await;
        assert!(!reply.ok);
        assert!(reply.text.contains("no target chat"));
    }

    #[tokio::test]
    async fn add_with_explicit_chat_ref() {
        let store = Arc::new(InMemoryStore::new());
        let exec = executor(store.clone());
        let reply = exec
            .execute(
                "/expr add a b in qq:42:group w=1.5",
                &CommandContext::default(),
            )
            .await;
        assert!(reply.ok, "{}", reply.text);
        // Stored under the derived key, not the invoking chat.
        assert_eq!(store.page_by_chat(CHAT, 1, 10).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn list_paginates_and_orders() {
        let store = Arc::new(InMemoryStore::new());
        let exec = executor(store.clone());
        for i in 0..25 {
            store
                .create(NewExpression {
                    chat_id: CHAT.into(),
                    situation: format!("s{i}"),
                    style: format!("y{i}"),
                    weight: 0.1 + i as f64 * 0.1,
                })
                .await
                .unwrap();
        }

        let reply = exec.execute("/expr list", &in_chat()).await;
        assert!(reply.ok);
        assert!(!reply.record);
        assert!(reply.text.starts_with("共25条，页1/3"));
        assert_eq!(reply.text.lines().count(), 11); // header + 10 rows
        // Highest weight first.
        assert!(reply.text.lines().nth(1).unwrap().contains("s24"));
    }

    #[tokio::test]
    async fn list_empty_chat_shows_marker() {
        let exec = executor(Arc::new(InMemoryStore::new()));
        let reply = exec.execute("/expr list", &in_chat()).await;
        assert!(reply.ok);
        assert!(reply.text.contains("共0条，页1/1"));
        assert!(reply.text.contains("（无数据）"));
    }

    #[tokio::test]
    async fn delete_existing_and_missing() {
        let store = Arc::new(InMemoryStore::new());
        let exec = executor(store.clone());
        let expr = store
            .create(NewExpression {
                chat_id: CHAT.into(),
                situation: "s".into(),
                style: "y".into(),
                weight: 1.0,
            })
            .await
            .unwrap();

        let reply = exec
            .execute(&format!("/expr del {}", expr.id), &in_chat())
            .await;
        assert!(reply.ok);
        assert!(store.get(expr.id).await.unwrap().is_none());

        let reply = exec.execute("/expr del 999", &in_chat()).await;
        assert!(!reply.ok);
        assert!(reply.text.contains("999"));
    }

    #[tokio::test]
    async fn adjust_deletes_when_weight_exhausted() {
        let store = Arc::new(InMemoryStore::new());
        let exec = executor(store.clone());
        let expr = store
            .create(NewExpression {
                chat_id: CHAT.into(),
                situation: "s".into(),
                style: "y".into(),
                weight: 1.0,
            })
            .await
            .unwrap();

        let reply = exec
            .execute(&format!("/expr {} -3.0", expr.id), &in_chat())
            .await;
        assert!(reply.ok, "{}", reply.text);
        assert!(reply.text.contains("deleted"));
        assert!(store.get(expr.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn adjust_updates_and_clamps() {
        let store = Arc::new(InMemoryStore::new());
        let exec = executor(store.clone());
        let expr = store
            .create(NewExpression {
                chat_id: CHAT.into(),
                situation: "s".into(),
                style: "y".into(),
                weight: 1.0,
            })
            .await
            .unwrap();

        let reply = exec
            .execute(&format!("/expr {} +10.0", expr.id), &in_chat())
            .await;
        assert!(reply.ok);
        assert!(reply.text.contains("5.00"));
        assert_eq!(store.get(expr.id).await.unwrap().unwrap().weight, 5.0);
    }

    #[tokio::test]
    async fn adjust_rejects_wrong_chat() {
        let store = Arc::new(InMemoryStore::new());
        let exec = executor(store.clone());
        let expr = store
            .create(NewExpression {
                chat_id: "another-chat".into(),
                situation: "s".into(),
                style: "y".into(),
                weight: 1.0,
            })
            .await
            .unwrap();

        let reply = exec
            .execute(&format!("/expr {} +0.5", expr.id), &in_chat())
            .await;
        assert!(!reply.ok);
        assert!(reply.text.contains("target chat"));
    }

    #[tokio::test]
    async fn unmatched_text_yields_family_usage() {
        let exec = executor(Arc::new(InMemoryStore::new()));

        let reply = exec.execute("/expr add onlyonearg", &in_chat()).await;
        assert!(!reply.ok);
        assert!(reply.text.contains("add <situation>"));

        let reply = exec.execute("/expr 123 0.5", &in_chat()).await;
        assert!(!reply.ok);
        assert!(reply.text.contains("+/-delta"));
    }

    #[tokio::test]
    async fn review_renders_usage_records() {
        let store = Arc::new(InMemoryStore::new());
        let exec = executor(store.clone());
        let expr = store
            .create(NewExpression {
                chat_id: CHAT.into(),
                situation: "道歉".into(),
                style: "对不起啦".into(),
                weight: 1.2,
            })
            .await
            .unwrap();
        store
            .insert_message(ChatMessage {
                message_id: "m1".into(),
                chat_id: CHAT.into(),
                sender_id: BOT.into(),
                sender_name: None,
                text: "对不起啦".into(),
                timestamp: now_epoch() - 10.0,
                selected_expressions: Some(format!("[{}, 999]", expr.id)),
            })
            .await
            .unwrap();

        let reply = exec.execute("/expr review", &in_chat()).await;
        assert!(reply.ok, "{}", reply.text);
        assert!(!reply.record);
        assert!(reply.text.contains(&format!("ID {}: 道歉 -> 对不起啦", expr.id)));
        assert!(reply.text.contains("ID 999: expression missing"));
    }

    #[tokio::test]
    async fn review_without_bot_messages_is_informative_success() {
        let store = Arc::new(InMemoryStore::new());
        let exec = executor(store.clone());
        store
            .insert_message(ChatMessage {
                message_id: "m1".into(),
                chat_id: CHAT.into(),
                sender_id: "user".into(),
                sender_name: None,
                text: "hello".into(),
                timestamp: now_epoch() - 10.0,
                selected_expressions: None,
            })
            .await
            .unwrap();

        let reply = exec.execute("/expr review", &in_chat()).await;
        assert!(reply.ok);
        assert!(reply.text.contains("no messages from Mai"));
    }

    #[tokio::test]
    async fn learn_through_executor_updates_store() {
        let store = Arc::new(InMemoryStore::new());
        let expr = store
            .create(NewExpression {
                chat_id: CHAT.into(),
                situation: "道歉".into(),
                style: "对不起啦".into(),
                weight: 1.0,
            })
            .await
            .unwrap();
        store
            .insert_message(ChatMessage {
                message_id: "m1".into(),
                chat_id: CHAT.into(),
                sender_id: BOT.into(),
                sender_name: None,
                text: "对不起啦".into(),
                timestamp: now_epoch() - 10.0,
                selected_expressions: Some(format!("[{}]", expr.id)),
            })
            .await
            .unwrap();

        let models = Arc::new(ScriptedModels::new(&[
            format!(r#"{{"used_expressions": [{{"id": {}}}]}}"#, expr.id),
            format!(
                r#"{{"expressions": [{{"id": {}, "new_situation": "道歉语境", "reason": "更准确"}}]}}"#,
                expr.id
            ),
        ]));
        let exec = executor_with(store.clone(), models);

        let reply = exec.execute("/expr learn 更自然一点", &in_chat()).await;
        assert!(reply.ok, "{}", reply.text);
        assert!(reply.text.contains("updated 1 expression"));

        let refined = store.get(expr.id).await.unwrap().unwrap();
        assert_eq!(refined.situation, "道歉语境");
        assert!((refined.weight - 1.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn learn_without_models_reports_upstream_failure() {
        let store = Arc::new(InMemoryStore::new());
        let expr = store
            .create(NewExpression {
                chat_id: CHAT.into(),
                situation: "s".into(),
                style: "y".into(),
                weight: 1.0,
            })
            .await
            .unwrap();
        store
            .insert_message(ChatMessage {
                message_id: "m1".into(),
                chat_id: CHAT.into(),
                sender_id: BOT.into(),
                sender_name: None,
                text: "y".into(),
                timestamp: now_epoch() - 10.0,
                selected_expressions: Some(format!("[{}]", expr.id)),
            })
            .await
            .unwrap();

        let exec = executor(store);
        let reply = exec.execute("/expr learn", &in_chat()).await;
        assert!(!reply.ok);
        assert!(reply.text.contains("no model available"));
    }

    #[tokio::test]
    async fn analyze_missing_message_fails() {
        let exec = executor(Arc::new(InMemoryStore::new()));
        let reply = exec.execute("/expr msg ghost", &in_chat()).await;
        assert!(!reply.ok);
        assert!(reply.text.contains("not found"));
    }
}
