//! # Parlance Models
//!
//! LLM backend implementations of [`parlance_core::ModelClient`].
//!
//! [`OpenAiCompatClient`] covers the vast majority of providers since most
//! expose an OpenAI-compatible `/v1/chat/completions` endpoint.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatClient;
