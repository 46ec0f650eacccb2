//! SQLite backend for expressions and the message log.
//!
//! Uses a single SQLite database file with two tables:
//! - `expressions` — the per-chat (situation, style, weight) records
//! - `messages` — the chat message log with the `selected_expressions`
//!   field the analysis pipelines read back
//!
//! Expression ids are the integer rowid, assigned on insert and never
//! reused for updates.

use async_trait::async_trait;
use parlance_core::error::{HistoryError, StoreError};
use parlance_core::expression::{now_epoch, Expression, ExpressionPage, NewExpression};
use parlance_core::history::{ChatMessage, FetchOrder, MessageHistory};
use parlance_core::store::ExpressionStore;
use parlance_core::EXPRESSION_KIND;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

/// A production SQLite store.
pub struct SqliteStore {
    pool: SqlitePool,
    /// The agent's own sender id, used when a history query excludes the
    /// agent's messages.
    self_id: Option<String>,
}

impl SqliteStore {
    /// Create a new SQLite store from a file path.
    ///
    /// The database and all tables/indexes are created automatically.
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self {
            pool,
            self_id: None,
        };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    /// Set the agent's own sender id for `include_self = false` filtering.
    pub fn with_self_id(mut self, self_id: impl Into<String>) -> Self {
        self.self_id = Some(self_id.into());
        self
    }

    /// Run schema migrations — creates both tables and their indexes.
    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS expressions (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id          TEXT NOT NULL,
                situation        TEXT NOT NULL,
                style            TEXT NOT NULL,
                weight           REAL NOT NULL,
                last_active_time REAL NOT NULL,
                create_date      REAL,
                kind             TEXT NOT NULL DEFAULT 'expression'
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("expressions table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_expressions_chat_order
             ON expressions(chat_id, weight DESC, last_active_time DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("expressions index: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                message_id           TEXT PRIMARY KEY,
                chat_id              TEXT NOT NULL,
                sender_id            TEXT NOT NULL,
                sender_name          TEXT,
                text                 TEXT NOT NULL,
                timestamp            REAL NOT NULL,
                selected_expressions TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("messages table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_chat_time
             ON messages(chat_id, timestamp)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("messages index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    /// Parse an [`Expression`] from a SQLite row.
    fn row_to_expression(row: &sqlx::sqlite::SqliteRow) -> Result<Expression, StoreError> {
        let id: i64 = row
            .try_get("id")
            .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?;
        let chat_id: String = row
            .try_get("chat_id")
            .map_err(|e| StoreError::QueryFailed(format!("chat_id column: {e}")))?;
        let situation: String = row
            .try_get("situation")
            .map_err(|e| StoreError::QueryFailed(format!("situation column: {e}")))?;
        let style: String = row
            .try_get("style")
            .map_err(|e| StoreError::QueryFailed(format!("style column: {e}")))?;
        let weight: f64 = row
            .try_get("weight")
            .map_err(|e| StoreError::QueryFailed(format!("weight column: {e}")))?;
        let last_active_time: f64 = row
            .try_get("last_active_time")
            .map_err(|e| StoreError::QueryFailed(format!("last_active_time column: {e}")))?;
        let create_date: Option<f64> = row
            .try_get("create_date")
            .map_err(|e| StoreError::QueryFailed(format!("create_date column: {e}")))?;
        let kind: String = row.try_get("kind").unwrap_or_else(|_| EXPRESSION_KIND.into());

        Ok(Expression {
            id,
            chat_id,
            situation,
            style,
            weight,
            last_active_time,
            create_date,
            kind,
        })
    }

    /// Parse a [`ChatMessage`] from a SQLite row.
    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<ChatMessage, HistoryError> {
        let message_id: String = row
            .try_get("message_id")
            .map_err(|e| HistoryError::QueryFailed(format!("message_id column: {e}")))?;
        let chat_id: String = row
            .try_get("chat_id")
            .map_err(|e| HistoryError::QueryFailed(format!("chat_id column: {e}")))?;
        let sender_id: String = row
            .try_get("sender_id")
            .map_err(|e| HistoryError::QueryFailed(format!("sender_id column: {e}")))?;
        let sender_name: Option<String> = row
            .try_get("sender_name")
            .map_err(|e| HistoryError::QueryFailed(format!("sender_name column: {e}")))?;
        let text: String = row
            .try_get("text")
            .map_err(|e| HistoryError::QueryFailed(format!("text column: {e}")))?;
        let timestamp: f64 = row
            .try_get("timestamp")
            .map_err(|e| HistoryError::QueryFailed(format!("timestamp column: {e}")))?;
        let selected_expressions: Option<String> = row
            .try_get("selected_expressions")
            .map_err(|e| HistoryError::QueryFailed(format!("selected_expressions column: {e}")))?;

        Ok(ChatMessage {
            message_id,
            chat_id,
            sender_id,
            sender_name,
            text,
            timestamp,
            selected_expressions,
        })
    }

    /// Fetch a time-bounded window, truncated to `limit` according to
    /// `order`, returned in ascending timestamp order.
    async fn fetch_window(
        &self,
        chat_id: &str,
        start: f64,
        end: f64,
        limit: u64,
        order: FetchOrder,
        include_self: bool,
    ) -> Result<Vec<ChatMessage>, HistoryError> {
        let sender_filter = self.sender_filter(include_self);
        let sql_order = match order {
            FetchOrder::Latest => "DESC",
            FetchOrder::Earliest => "ASC",
        };
        let sql = format!(
            "SELECT * FROM messages
             WHERE chat_id = ? AND timestamp > ? AND timestamp <= ? {sender_filter}
             ORDER BY timestamp {sql_order} LIMIT ?"
        );

        let mut query = sqlx::query(&sql).bind(chat_id).bind(start).bind(end);
        if !sender_filter.is_empty() {
            query = query.bind(self.self_id.as_deref().unwrap_or_default());
        }
        query = query.bind(limit as i64);

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| HistoryError::QueryFailed(format!("window fetch: {e}")))?;

        let mut messages: Vec<ChatMessage> = rows
            .iter()
            .map(Self::row_to_message)
            .collect::<Result<_, _>>()?;
        if order == FetchOrder::Latest {
            messages.reverse();
        }
        Ok(messages)
    }

    fn sender_filter(&self, include_self: bool) -> &'static str {
        if !include_self && self.self_id.is_some() {
            "AND sender_id != ?"
        } else {
            ""
        }
    }
}

#[async_trait]
impl ExpressionStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn create(&self, new: NewExpression) -> Result<Expression, StoreError> {
        let now = now_epoch();
        let result = sqlx::query(
            r#"
            INSERT INTO expressions (chat_id, situation, style, weight, last_active_time, create_date, kind)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&new.chat_id)
        .bind(&new.situation)
        .bind(&new.style)
        .bind(new.weight)
        .bind(now)
        .bind(now)
        .bind(EXPRESSION_KIND)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT failed: {e}")))?;

        let id = result.last_insert_rowid();
        debug!(id, chat_id = %new.chat_id, "Created expression");

        Ok(Expression {
            id,
            chat_id: new.chat_id,
            situation: new.situation,
            style: new.style,
            weight: new.weight,
            last_active_time: now,
            create_date: Some(now),
            kind: EXPRESSION_KIND.into(),
        })
    }

    async fn get(&self, id: i64) -> Result<Option<Expression>, StoreError> {
        let row = sqlx::query("SELECT * FROM expressions WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("GET by id: {e}")))?;

        match row {
            Some(ref r) => Ok(Some(Self::row_to_expression(r)?)),
            None => Ok(None),
        }
    }

    async fn find_exact(
        &self,
        chat_id: &str,
        situation: &str,
        style: &str,
    ) -> Result<Option<Expression>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM expressions
             WHERE chat_id = ?1 AND situation = ?2 AND style = ?3
             LIMIT 1",
        )
        .bind(chat_id)
        .bind(situation)
        .bind(style)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("exact lookup: {e}")))?;

        match row {
            Some(ref r) => Ok(Some(Self::row_to_expression(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, expr: &Expression) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE expressions
            SET chat_id = ?1, situation = ?2, style = ?3, weight = ?4,
                last_active_time = ?5, create_date = ?6, kind = ?7
            WHERE id = ?8
            "#,
        )
        .bind(&expr.chat_id)
        .bind(&expr.situation)
        .bind(&expr.style)
        .bind(expr.weight)
        .bind(expr.last_active_time)
        .bind(expr.create_date)
        .bind(&expr.kind)
        .bind(expr.id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("UPDATE failed: {e}")))?;

        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM expressions WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("DELETE failed: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    async fn page_by_chat(
        &self,
        chat_id: &str,
        page: u64,
        size: u64,
    ) -> Result<ExpressionPage, StoreError> {
        let size = size.max(1);
        let row = sqlx::query("SELECT COUNT(*) as cnt FROM expressions WHERE chat_id = ?1")
            .bind(chat_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("COUNT: {e}")))?;
        let total: i64 = row
            .try_get("cnt")
            .map_err(|e| StoreError::QueryFailed(format!("cnt column: {e}")))?;
        let total = total as u64;

        let page_count = (total.div_ceil(size)).max(1);
        let page = page.clamp(1, page_count);
        let offset = (page - 1) * size;

        let rows = sqlx::query(
            "SELECT * FROM expressions WHERE chat_id = ?1
             ORDER BY weight DESC, last_active_time DESC
             LIMIT ?2 OFFSET ?3",
        )
        .bind(chat_id)
        .bind(size as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("page fetch: {e}")))?;

        let rows = rows
            .iter()
            .map(Self::row_to_expression)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ExpressionPage {
            total,
            page,
            page_count,
            rows,
        })
    }
}

#[async_trait]
impl MessageHistory for SqliteStore {
    async fn recent_messages(
        &self,
        chat_id: &str,
        hours: f64,
        limit: u64,
        order: FetchOrder,
        include_self: bool,
    ) -> Result<Vec<ChatMessage>, HistoryError> {
        let now = now_epoch();
        let start = now - hours * 3600.0;
        self.fetch_window(chat_id, start, now, limit, order, include_self)
            .await
    }

    async fn messages_before(
        &self,
        chat_id: &str,
        timestamp: f64,
        limit: u64,
        include_self: bool,
    ) -> Result<Vec<ChatMessage>, HistoryError> {
        // Newest-first selection strictly below the bound, delivered ascending.
        let sender_filter = self.sender_filter(include_self);
        let sql = format!(
            "SELECT * FROM messages
             WHERE chat_id = ? AND timestamp < ? {sender_filter}
             ORDER BY timestamp DESC LIMIT ?"
        );

        let mut query = sqlx::query(&sql).bind(chat_id).bind(timestamp);
        if !sender_filter.is_empty() {
            query = query.bind(self.self_id.as_deref().unwrap_or_default());
        }
        query = query.bind(limit as i64);

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| HistoryError::QueryFailed(format!("before fetch: {e}")))?;

        let mut messages: Vec<ChatMessage> = rows
            .iter()
            .map(Self::row_to_message)
            .collect::<Result<_, _>>()?;
        messages.reverse();
        Ok(messages)
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
        self.fetch_window(chat_id, start, end, limit, order, include_self)
            .await
    }

    async fn message_by_id(
        &self,
        message_id: &str,
    ) -> Result<Option<ChatMessage>, HistoryError> {
        let row = sqlx::query("SELECT * FROM messages WHERE message_id = ?1")
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| HistoryError::QueryFailed(format!("message by id: {e}")))?;

        match row {
            Some(ref r) => Ok(Some(Self::row_to_message(r)?)),
            None => Ok(None),
        }
    }

    async fn insert_message(&self, msg: ChatMessage) -> Result<(), HistoryError> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO messages
                (message_id, chat_id, sender_id, sender_name, text, timestamp, selected_expressions)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&msg.message_id)
        .bind(&msg.chat_id)
        .bind(&msg.sender_id)
        .bind(&msg.sender_name)
        .bind(&msg.text)
        .bind(msg.timestamp)
        .bind(&msg.selected_expressions)
        .execute(&self.pool)
        .await
        .map_err(|e| HistoryError::Storage(format!("message INSERT failed: {e}")))?;

        Ok(())
    }
}
