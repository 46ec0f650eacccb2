//! Configuration loading and validation for Parlance.
//!
//! Loads configuration from a TOML file with an environment-variable
//! override for the API key. Every field has a serde default so a partial
//! (or absent) file still yields a working configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Environment variable overriding `[models].api_key`.
pub const API_KEY_ENV: &str = "PARLANCE_API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

/// The root configuration structure.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub bot: BotConfig,

    #[serde(default)]
    pub models: ModelsConfig,

    #[serde(default)]
    pub list: ListConfig,

    #[serde(default)]
    pub review: ReviewConfig,

    #[serde(default)]
    pub learn: LearnConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database path (any sqlx SQLite URL works).
    #[serde(default = "default_store_path")]
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Sender id the host stamps on the agent's messages.
    #[serde(default = "default_bot_id")]
    pub id: String,

    /// Display name used in prompts and reports.
    #[serde(default = "default_bot_nickname")]
    pub nickname: String,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// OpenAI-compatible endpoint base URL.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// API key; prefer the `PARLANCE_API_KEY` environment variable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// role → provider-side model name (e.g. `utils = "gpt-4o-mini"`).
    #[serde(default)]
    pub roles: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u64,

    #[serde(default = "default_max_page_size")]
    pub max_page_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    #[serde(default = "default_review_hours")]
    pub hours: f64,

    #[serde(default = "default_review_limit")]
    pub limit: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnConfig {
    #[serde(default = "default_history_hours")]
    pub history_hours: f64,

    #[serde(default = "default_history_limit")]
    pub history_limit: u64,

    #[serde(default = "default_context_before")]
    pub context_before: u64,

    #[serde(default = "default_context_after")]
    pub context_after: u64,
}

fn default_store_path() -> String {
    "sqlite://parlance.db".into()
}
fn default_bot_id() -> String {
    "parlance-bot".into()
}
fn default_bot_nickname() -> String {
    "Parlance".into()
}
fn default_api_url() -> String {
    "http://localhost:11434/v1".into()
}
fn default_page_size() -> u64 {
    10
}
fn default_max_page_size() -> u64 {
    50
}
fn default_review_hours() -> f64 {
    24.0
}
fn default_review_limit() -> u64 {
    15
}
fn default_history_hours() -> f64 {
    24.0
}
fn default_history_limit() -> u64 {
    100
}
fn default_context_before() -> u64 {
    10
}
fn default_context_after() -> u64 {
    5
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            id: default_bot_id(),
            nickname: default_bot_nickname(),
        }
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: None,
            roles: HashMap::new(),
        }
    }
}

impl Default for ListConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            hours: default_review_hours(),
            limit: default_review_limit(),
        }
    }
}

impl Default for LearnConfig {
    fn default() -> Self {
        Self {
            history_hours: default_history_hours(),
            history_limit: default_history_limit(),
            context_before: default_context_before(),
            context_after: default_context_after(),
        }
    }
}

fn redact(secret: &Option<String>) -> &'static str {
    match secret {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ModelsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelsConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("roles", &self.roles)
            .finish()
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("store", &self.store)
            .field("bot", &self.bot)
            .field("models", &self.models)
            .field("list", &self.list)
            .field("review", &self.review)
            .field("learn", &self.learn)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from a TOML file, then apply environment
    /// overrides. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
            toml::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?
        } else {
            debug!(path = %path.display(), "config file absent, using defaults");
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Apply environment-variable overrides.
    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.is_empty() {
                self.models.api_key = Some(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_complete() {
        let config = AppConfig::default();
        assert_eq!(config.store.path, "sqlite://parlance.db");
        assert_eq!(config.list.page_size, 10);
        assert_eq!(config.learn.context_before, 10);
        assert_eq!(config.learn.context_after, 5);
        assert!(config.models.roles.is_empty());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[store]
path = "custom.db"

[models]
api_url = "https://api.example.com/v1"

[models.roles]
utils = "small-model"
chat = "big-model"
"#
        )
        .unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.store.path, "custom.db");
        assert_eq!(config.models.api_url, "https://api.example.com/v1");
        assert_eq!(config.models.roles["utils"], "small-model");
        // Untouched sections keep their defaults.
        assert_eq!(config.review.limit, 15);
        assert_eq!(config.bot.nickname, "Parlance");
    }

    #[test]
    fn missing_file_is_defaults() {
        let config = AppConfig::load(Path::new("/nonexistent/parlance.toml")).unwrap();
        assert_eq!(config.store.path, "sqlite://parlance.db");
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not [valid toml").unwrap();
        let err = AppConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = AppConfig {
            models: ModelsConfig {
                api_key: Some("sk-secret-key".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let debugged = format!("{config:?}");
        assert!(!debugged.contains("sk-secret-key"));
        assert!(debugged.contains("[REDACTED]"));
    }
}
