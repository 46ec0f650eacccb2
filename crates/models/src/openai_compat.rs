//! OpenAI-compatible model client.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, DeepSeek, and any other
//! endpoint exposing `/v1/chat/completions`. One client holds the role →
//! model mapping the command layer selects from; every generation is a
//! one-shot single-user-message completion.

use async_trait::async_trait;
use parlance_core::error::ModelError;
use parlance_core::model::{Generation, ModelClient, ModelHandle};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, warn};

/// An OpenAI-compatible LLM client.
pub struct OpenAiCompatClient {
    name: String,
    base_url: String,
    api_key: String,
    /// role → provider-side model name.
    roles: HashMap<String, String>,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    /// Create a new OpenAI-compatible client.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            roles: HashMap::new(),
            client,
        }
    }

    /// Register a role → model mapping (e.g. `"utils"` → `"gpt-4o-mini"`).
    pub fn with_role(mut self, role: impl Into<String>, model: impl Into<String>) -> Self {
        self.roles.insert(role.into(), model.into());
        self
    }

    /// Register several role → model mappings at once.
    pub fn with_roles(mut self, roles: impl IntoIterator<Item = (String, String)>) -> Self {
        self.roles.extend(roles);
        self
    }

    /// Create an Ollama client (convenience constructor).
    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
        )
    }
}

#[async_trait]
impl ModelClient for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn available_models(&self) -> HashMap<String, ModelHandle> {
        self.roles
            .iter()
            .map(|(role, model)| {
                (
                    role.clone(),
                    ModelHandle {
                        role: role.clone(),
                        model: model.clone(),
                    },
                )
            })
            .collect()
    }

    async fn generate(
        &self,
        prompt: &str,
        handle: &ModelHandle,
        request_tag: &str,
    ) -> Result<Generation, ModelError> {
        let url = format!("{}/chat/completions", self.base_url);

        let body = serde_json::json!({
            "model": handle.model,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": false,
            "user": request_tag,
        });

        debug!(
            client = %self.name,
            model = %handle.model,
            role = %handle.role,
            request_tag,
            prompt_len = prompt.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ModelError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(ModelError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Model backend returned error");
            return Err(ModelError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ModelError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        let model_name = api_response.model.unwrap_or_else(|| handle.model.clone());
        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::ApiError {
                status_code: 200,
                message: "No choices in response".into(),
            })?;

        Ok(Generation {
            text: choice.message.content.unwrap_or_default(),
            reasoning: choice.message.reasoning_content,
            model_name,
        })
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    content: Option<String>,
    /// Reasoning text some providers (DeepSeek-style) return alongside
    /// the answer.
    #[serde(default)]
    reasoning_content: Option<String>,
}
