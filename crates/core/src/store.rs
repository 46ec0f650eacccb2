//! ExpressionStore trait — the persistence boundary for expression records.
//!
//! Implementations: SQLite (production), in-memory (for testing).
//! IDs are store-assigned and globally unique; (chat_id, situation, style)
//! is a soft-duplicate key — the store does not enforce uniqueness, so the
//! add path re-checks with [`ExpressionStore::find_exact`] before insert.

use crate::error::StoreError;
use crate::expression::{Expression, ExpressionPage, NewExpression};
use async_trait::async_trait;

/// The persistence boundary for expression records.
#[async_trait]
pub trait ExpressionStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Persist a new expression. The store assigns the id and stamps
    /// `last_active_time` and `create_date`.
    async fn create(&self, new: NewExpression) -> Result<Expression, StoreError>;

    /// Fetch a record by id.
    async fn get(&self, id: i64) -> Result<Option<Expression>, StoreError>;

    /// Exact-match lookup on the soft-duplicate key. Case- and
    /// whitespace-sensitive: near-duplicate phrasing is a distinct record.
    async fn find_exact(
        &self,
        chat_id: &str,
        situation: &str,
        style: &str,
    ) -> Result<Option<Expression>, StoreError>;

    /// Write back a mutated record.
    async fn save(&self, expr: &Expression) -> Result<(), StoreError>;

    /// Delete by id. Returns whether a row was removed.
    async fn delete(&self, id: i64) -> Result<bool, StoreError>;

    /// One page of a chat's expressions ordered by weight desc, then
    /// `last_active_time` desc. `page` is 1-based and clamped into range;
    /// `page_count` is at least 1 even when the chat is empty.
    async fn page_by_chat(
        &self,
        chat_id: &str,
        page: u64,
        size: u64,
    ) -> Result<ExpressionPage, StoreError>;
}
