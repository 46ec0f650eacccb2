//! Message history — the boundary to the host's chat message log.
//!
//! The reply generator stamps the bot's own messages with the textual list
//! of expression ids it drew from (`selected_expressions`, e.g.
//! `"[62, 201, 386]"`); the analysis pipelines read that field back.

use crate::error::HistoryError;
use async_trait::async_trait;

/// A chat message as the host records it.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChatMessage {
    pub message_id: String,
    pub chat_id: String,
    pub sender_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    pub text: String,
    /// Epoch seconds.
    pub timestamp: f64,
    /// Bracketed id list stamped on bot messages, absent elsewhere.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_expressions: Option<String>,
}

/// Which end of a time-bounded window to keep when truncating to a limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOrder {
    /// Keep the newest messages.
    Latest,
    /// Keep the oldest messages.
    Earliest,
}

/// Read access to the host's message log.
///
/// All fetch methods return messages in ascending timestamp order.
/// `include_self = false` filters out the agent's own messages.
#[async_trait]
pub trait MessageHistory: Send + Sync {
    /// Messages from the last `hours` in a chat, truncated to `limit`
    /// according to `order`.
    async fn recent_messages(
        &self,
        chat_id: &str,
        hours: f64,
        limit: u64,
        order: FetchOrder,
        include_self: bool,
    ) -> Result<Vec<ChatMessage>, HistoryError>;

    /// Up to `limit` messages strictly before `timestamp`, newest-first
    /// selection returned in ascending order.
    async fn messages_before(
        &self,
        chat_id: &str,
        timestamp: f64,
        limit: u64,
        include_self: bool,
    ) -> Result<Vec<ChatMessage>, HistoryError>;

    /// Messages with `start < timestamp <= end`, truncated to `limit`
    /// according to `order`.
    async fn messages_between(
        &self,
        chat_id: &str,
        start: f64,
        end: f64,
        limit: u64,
        order: FetchOrder,
        include_self: bool,
    ) -> Result<Vec<ChatMessage>, HistoryError>;

    /// Look up one message by its literal id.
    async fn message_by_id(&self, message_id: &str)
        -> Result<Option<ChatMessage>, HistoryError>;

    /// Record a message (used by hosts that route delivery through us,
    /// and by tests to seed a log).
    async fn insert_message(&self, msg: ChatMessage) -> Result<(), HistoryError>;
}

/// Options for [`render_readable`].
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Replace this sender id's display name with `bot_name`.
    pub bot_id: Option<String>,
    /// Display name used for the bot's own messages.
    pub bot_name: Option<String>,
}

/// Render a message window as readable transcript text, one line per
/// message: `[HH:MM:SS] name: text`.
pub fn render_readable(messages: &[ChatMessage], options: &RenderOptions) -> String {
    let mut out = String::with_capacity(messages.len() * 64);
    for msg in messages {
        let is_bot = options
            .bot_id
            .as_deref()
            .is_some_and(|id| id == msg.sender_id);
        let name = if is_bot {
            options
                .bot_name
                .as_deref()
                .or(msg.sender_name.as_deref())
                .unwrap_or(msg.sender_id.as_str())
        } else {
            msg.sender_name.as_deref().unwrap_or(msg.sender_id.as_str())
        };
        let time = format_clock(msg.timestamp);
        out.push_str(&format!("[{time}] {name}: {text}\n", text = msg.text));
    }
    out
}

fn format_clock(ts: f64) -> String {
    use chrono::{Local, TimeZone};
    match Local.timestamp_opt(ts as i64, 0) {
        chrono::LocalResult::Single(dt) => dt.format("%H:%M:%S").to_string(),
        _ => format!("{ts}"),
    }
}
