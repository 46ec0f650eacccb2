//! Error types for the Parlance domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each collaborator boundary has its own error type; command execution
//! failures that carry user-facing text live on the top-level [`Error`].

use thiserror::Error;

/// The top-level error type for all Parlance operations.
///
/// Every variant is local to one command invocation; none is fatal to the
/// process. Variants caused by input shape carry the usage text to show
/// the user.
#[derive(Debug, Error)]
pub enum Error {
    /// Input text did not match any recognized command shape.
    #[error("{usage}")]
    Parse { usage: String },

    /// A chat reference could not be normalized and no fallback exists.
    #[error("no target chat: {0}")]
    Resolution(String),

    /// A referenced expression or message does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The model response was not recoverable JSON even after repair.
    /// Carries the raw payload (truncated) for user display.
    #[error("malformed model response: {detail}\nraw response: {raw}")]
    Format { detail: String, raw: String },

    // --- Collaborator errors ---
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("history error: {0}")]
    History(#[from] HistoryError),

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Collaborator boundary errors ---

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("query failed: {0}")]
    QueryFailed(String),

    #[error("migration failed: {0}")]
    MigrationFailed(String),
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history query failed: {0}")]
    QueryFailed(String),

    #[error("history storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("no model available")]
    NoModelAvailable,

    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("network error: {0}")]
    Network(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_displays_usage_verbatim() {
        let err = Error::Parse {
            usage: "usage: /expr add <situation> <style>".into(),
        };
        assert_eq!(err.to_string(), "usage: /expr add <situation> <style>");
    }

    #[test]
    fn model_error_converts_to_top_level() {
        let err: Error = ModelError::NoModelAvailable.into();
        assert!(err.to_string().contains("no model available"));
    }

    #[test]
    fn format_error_carries_raw_payload() {
        let err = Error::Format {
            detail: "no JSON object in response".into(),
            raw: "Sure, here you go!".into(),
        };
        let text = err.to_string();
        assert!(text.contains("no JSON object"));
        assert!(text.contains("Sure, here you go!"));
    }
}
