//! `parlance exec` — run one expression command line.

use parlance_analysis::{BotIdentity, LearnSettings};
use parlance_commands::{canonicalize, CommandContext, CommandExecutor, ReviewSettings};
use parlance_config::AppConfig;
use parlance_models::OpenAiCompatClient;
use parlance_store::SqliteStore;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

pub async fn run(
    config_path: &Path,
    text: String,
    chat: Option<String>,
    sender: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load(config_path)?;
    let executor = build_executor(&config).await?;

    let chat_id = match chat.as_deref() {
        Some(token) => {
            let resolved = canonicalize(token);
            if resolved.is_none() {
                warn!(token, "unresolvable --chat reference, falling back to none");
            }
            resolved
        }
        None => None,
    };
    let ctx = CommandContext {
        chat_id,
        sender_id: sender,
    };

    let reply = executor.execute(&text, &ctx).await;
    println!("{}", reply.text);
    if !reply.ok {
        std::process::exit(1);
    }
    Ok(())
}

/// Wire config → store → models → executor.
pub async fn build_executor(
    config: &AppConfig,
) -> Result<CommandExecutor, Box<dyn std::error::Error>> {
    let store = Arc::new(
        SqliteStore::new(&config.store.path)
            .await?
            .with_self_id(&config.bot.id),
    );
    let models = Arc::new(
        OpenAiCompatClient::new(
            "openai_compat",
            &config.models.api_url,
            config.models.api_key.clone().unwrap_or_default(),
        )
        .with_roles(config.models.roles.clone()),
    );

    Ok(CommandExecutor::new(
        store.clone(),
        store,
        models,
        BotIdentity {
            id: config.bot.id.clone(),
            nickname: config.bot.nickname.clone(),
        },
    )
    .with_learn_settings(LearnSettings {
        history_hours: config.learn.history_hours,
        history_limit: config.learn.history_limit,
        context_before: config.learn.context_before,
        context_after: config.learn.context_after,
    })
    .with_review_settings(ReviewSettings {
        hours: config.review.hours,
        limit: config.review.limit,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn build_executor_from_default_config() {
        let config = AppConfig {
            store: parlance_config::StoreConfig {
                path: "sqlite::memory:".into(),
            },
            ..Default::default()
        };
        let executor = build_executor(&config).await.unwrap();

        // A direct command runs end to end against the wired store.
        let reply = executor
            .execute(
                "/expr list in qq:1:group",
                &CommandContext::default(),
            )
            .await;
        assert!(reply.ok, "{}", reply.text);
        assert!(reply.text.contains("共0条"));
    }
}
