//! ModelClient trait — the abstraction over LLM backends.
//!
//! The host exposes a mapping of roles (`utils`, `chat`, ...) to concrete
//! model handles; callers pick one with [`select_preferred`] and run a
//! one-shot prompt → text generation. Invocation failures are surfaced
//! verbatim and never retried here.

use crate::error::ModelError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Role names checked first, in order, when selecting a model.
pub const PREFERRED_ROLES: [&str; 2] = ["utils", "chat"];

/// A concrete model a role maps to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelHandle {
    /// The role this handle was registered under.
    pub role: String,
    /// The provider-side model name.
    pub model: String,
}

/// The result of one generation call.
#[derive(Debug, Clone)]
pub struct Generation {
    /// The response text.
    pub text: String,
    /// Provider-reported reasoning content, when present.
    pub reasoning: Option<String>,
    /// Which model actually responded.
    pub model_name: String,
}

/// The core ModelClient trait.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// A human-readable name for this client.
    fn name(&self) -> &str;

    /// The role → handle mapping currently available.
    async fn available_models(&self) -> HashMap<String, ModelHandle>;

    /// Run one prompt against a handle. `request_tag` labels the call for
    /// provider-side accounting and logs.
    async fn generate(
        &self,
        prompt: &str,
        handle: &ModelHandle,
        request_tag: &str,
    ) -> Result<Generation, ModelError>;
}

/// Pick a handle from the available pool: `utils` first, then `chat`, then
/// the remaining role with the lexicographically smallest name so the
/// fallback is deterministic. `None` when the pool is empty.
pub fn select_preferred(models: &HashMap<String, ModelHandle>) -> Option<&ModelHandle> {
    for role in PREFERRED_ROLES {
        if let Some(handle) = models.get(role) {
            return Some(handle);
        }
    }
    models
        .iter()
        .min_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, handle)| handle)
}
