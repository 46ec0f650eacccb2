//! In-memory backend — useful for testing and ephemeral sessions.

use async_trait::async_trait;
use parlance_core::error::{HistoryError, StoreError};
use parlance_core::expression::{now_epoch, Expression, ExpressionPage, NewExpression};
use parlance_core::history::{ChatMessage, FetchOrder, MessageHistory};
use parlance_core::store::ExpressionStore;
use parlance_core::EXPRESSION_KIND;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A store that keeps expressions and messages in Vecs.
/// Useful for tests and sessions where persistence isn't needed.
#[derive(Default)]
pub struct InMemoryStore {
    expressions: Arc<RwLock<Vec<Expression>>>,
    messages: Arc<RwLock<Vec<ChatMessage>>>,
    self_id: Option<String>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the agent's own sender id for `include_self = false` filtering.
    pub fn with_self_id(mut self, self_id: impl Into<String>) -> Self {
        self.self_id = Some(self_id.into());
        self
    }

    fn window(
        &self,
        messages: &[ChatMessage],
        chat_id: &str,
        start: f64,
        end: f64,
        limit: u64,
        order: FetchOrder,
        include_self: bool,
    ) -> Vec<ChatMessage> {
        let mut hits: Vec<ChatMessage> = messages
            .iter()
            .filter(|m| m.chat_id == chat_id && m.timestamp > start && m.timestamp <= end)
            .filter(|m| {
                include_self
                    || self
                        .self_id
                        .as_deref()
                        .is_none_or(|self_id| m.sender_id != self_id)
            })
            .cloned()
            .collect();
        hits.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

        let limit = limit as usize;
        if hits.len() > limit {
            match order {
                FetchOrder::Latest => {
                    hits = hits.split_off(hits.len() - limit);
                }
                FetchOrder::Earliest => {
                    hits.truncate(limit);
                }
            }
        }
        hits
    }
}

#[async_trait]
impl ExpressionStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn create(&self, new: NewExpression) -> Result<Expression, StoreError> {
        let mut expressions = self.expressions.write().await;
        let id = expressions.iter().map(|e| e.id).max().unwrap_or(0) + 1;
        let now = now_epoch();
        let expr = Expression {
            id,
            chat_id: new.chat_id,
            situation: new.situation,
            style: new.style,
            weight: new.weight,
            last_active_time: now,
            create_date: Some(now),
            kind: EXPRESSION_KIND.into(),
        };
        expressions.push(expr.clone());
        Ok(expr)
    }

    async fn get(&self, id: i64) -> Result<Option<Expression>, StoreError> {
        let expressions = self.expressions.read().await;
        Ok(expressions.iter().find(|e| e.id == id).cloned())
    }

    async fn find_exact(
        &self,
        chat_id: &str,
        situation: &str,
        style: &str,
    ) -> Result<Option<Expression>, StoreError> {
        let expressions = self.expressions.read().await;
        Ok(expressions
            .iter()
            .find(|e| e.chat_id == chat_id && e.situation == situation && e.style == style)
            .cloned())
    }

    async fn save(&self, expr: &Expression) -> Result<(), StoreError> {
        let mut expressions = self.expressions.write().await;
        match expressions.iter_mut().find(|e| e.id == expr.id) {
            Some(slot) => {
                *slot = expr.clone();
                Ok(())
            }
            None => Err(StoreError::Storage(format!(
                "no expression with id {}",
                expr.id
            ))),
        }
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let mut expressions = self.expressions.write().await;
        let len_before = expressions.len();
        expressions.retain(|e| e.id != id);
        Ok(expressions.len() < len_before)
    }

    async fn page_by_chat(
        &self,
        chat_id: &str,
        page: u64,
        size: u64,
    ) -> Result<ExpressionPage, StoreError> {
        let size = size.max(1);
        let expressions = self.expressions.read().await;
        let mut rows: Vec<Expression> = expressions
            .iter()
            .filter(|e| e.chat_id == chat_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.weight
                .total_cmp(&a.weight)
                .then(b.last_active_time.total_cmp(&a.last_active_time))
        });

        let total = rows.len() as u64;
        let page_count = (total.div_ceil(size)).max(1);
        let page = page.clamp(1, page_count);
        let offset = ((page - 1) * size) as usize;
        let rows: Vec<Expression> = rows.into_iter().skip(offset).take(size as usize).collect();

        Ok(ExpressionPage {
            total,
            page,
            page_count,
            rows,
        })
    }
}

#[async_trait]
impl MessageHistory for InMemoryStore {
    async fn recent_messages(
        &self,
        chat_id: &str,
        hours: f64,
        limit: u64,
        order: FetchOrder,
        include_self: bool,
    ) -> Result<Vec<ChatMessage>, HistoryError> {
        let now = now_epoch();
        let messages = self.messages.read().await;
        Ok(self.window(
            &messages,
            chat_id,
            now - hours * 3600.0,
            now,
            limit,
            order,
            include_self,
        ))
    }

    async fn messages_before(
        &self,
        chat_id: &str,
        timestamp: f64,
        limit: u64,
        include_self: bool,
    ) -> Result<Vec<ChatMessage>, HistoryError> {
        let messages = self.messages.read().await;
        let mut hits = self.window(
            &messages,
            chat_id,
            f64::NEG_INFINITY,
            timestamp,
            u64::MAX,
            FetchOrder::Latest,
            include_self,
        );
        // The window's upper end is inclusive; before is strict.
        hits.retain(|m| m.timestamp < timestamp);
        let limit = limit as usize;
        if hits.len() > limit {
            hits = hits.split_off(hits.len() - limit);
        }
        Ok(hits)
    }

    async fn messages_between(
        &self,
        chat_id: &str,
        start: f64,
        end: f64,
        limit: u64,
        order: FetchOrder,
        include_self: bool,
    ) -> Result<Vec<ChatMessage>, HistoryError> {
        let messages = self.messages.read().await;
        Ok(self.window(&messages, chat_id, start, end, limit, order, include_self))
    }

    async fn message_by_id(
        &self,
        message_id: &str,
    ) -> Result<Option<ChatMessage>, HistoryError> {
        let messages = self.messages.read().await;
        Ok(messages.iter().find(|m| m.message_id == message_id).cloned())
    }

    async fn insert_message(&self, msg: ChatMessage) -> Result<(), HistoryError> {
        let mut messages = self.messages.write().await;
        messages.retain(|m| m.message_id != msg.message_id);
        messages.push(msg);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_new(chat_id: &str, situation: &str, style: &str, weight: f64) -> NewExpression {
        NewExpression {
            chat_id: chat_id.into(),
            situation: situation.into(),
            style: style.into(),
            weight,
        }
    }

    fn make_msg(id: &str, sender: &str, ts: f64) -> ChatMessage {
        ChatMessage {
            message_id: id.into(),
            chat_id: "c1".into(),
            sender_id: sender.into(),
            sender_name: None,
            text: format!("text {id}"),
            timestamp: ts,
            selected_expressions: None,
        }
    }

    #[tokio::test]
    async fn ids_are_assigned_and_stable() {
        let store = InMemoryStore::new();
        let a = store.create(make_new("c", "a", "x", 1.0)).await.unwrap();
        let b = store.create(make_new("c", "b", "y", 1.0)).await.unwrap();
        assert_eq!(a.id + 1, b.id);

        // Deleting the latest does not recycle its id for updates of others.
        store.delete(b.id).await.unwrap();
        assert!(store.get(b.id).await.unwrap().is_none());
        assert!(store.get(a.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn save_missing_errors() {
        let store = InMemoryStore::new();
        let orphan = Expression {
            id: 42,
            chat_id: "c".into(),
            situation: "s".into(),
            style: "y".into(),
            weight: 1.0,
            last_active_time: 0.0,
            create_date: None,
            kind: EXPRESSION_KIND.into(),
        };
        assert!(store.save(&orphan).await.is_err());
    }

    #[tokio::test]
    async fn page_ordering_matches_sqlite_contract() {
        let store = InMemoryStore::new();
        for i in 0..7 {
            store
                .create(make_new("c", &format!("s{i}"), "y", 1.0 + i as f64 * 0.2))
                .await
                .unwrap();
        }
        let page = store.page_by_chat("c", 2, 3).await.unwrap();
        assert_eq!(page.total, 7);
        assert_eq!(page.page_count, 3);
        assert_eq!(page.rows.len(), 3);
        assert!(page.rows.windows(2).all(|w| w[0].weight >= w[1].weight));
    }

    #[tokio::test]
    async fn window_respects_order_and_limit() {
        let store = InMemoryStore::new();
        for i in 0..6 {
            store
                .insert_message(make_msg(&format!("m{i}"), "u1", 100.0 + i as f64))
                .await
                .unwrap();
        }

        let latest = store
            .messages_between("c1", 0.0, 1000.0, 2, FetchOrder::Latest, true)
            .await
            .unwrap();
        assert_eq!(latest[0].message_id, "m4");
        assert_eq!(latest[1].message_id, "m5");

        let earliest = store
            .messages_between("c1", 0.0, 1000.0, 2, FetchOrder::Earliest, true)
            .await
            .unwrap();
        assert_eq!(earliest[0].message_id, "m0");
        assert_eq!(earliest[1].message_id, "m1");
    }

    #[tokio::test]
    async fn self_filtering() {
        let store = InMemoryStore::new().with_self_id("bot");
        store.insert_message(make_msg("m1", "bot", 100.0)).await.unwrap();
        store.insert_message(make_msg("m2", "user", 101.0)).await.unwrap();

        let without_self = store
            .messages_between("c1", 0.0, 1000.0, 10, FetchOrder::Latest, false)
            .await
            .unwrap();
        assert_eq!(without_self.len(), 1);
        assert_eq!(without_self[0].sender_id, "user");
    }
}
