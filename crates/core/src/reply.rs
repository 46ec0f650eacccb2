//! Command replies.

use serde::{Deserialize, Serialize};

/// The tri-state result every command returns: a success flag, the
/// human-readable message, and whether the reply should be recorded in the
/// chat history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandReply {
    pub ok: bool,
    pub text: String,
    pub record: bool,
}

impl CommandReply {
    /// A successful reply, recorded in history.
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            ok: true,
            text: text.into(),
            record: true,
        }
    }

    /// A failed reply, recorded in history.
    pub fn fail(text: impl Into<String>) -> Self {
        Self {
            ok: false,
            text: text.into(),
            record: true,
        }
    }

    /// Override the record-in-history flag.
    pub fn with_record(mut self, record: bool) -> Self {
        self.record = record;
        self
    }
}
