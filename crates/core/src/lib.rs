//! # Parlance Core
//!
//! Domain types, traits, and error definitions for the Parlance expression
//! manager. This crate has **zero framework dependencies** — it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator boundary (store, message history, model backend) is
//! defined as a trait here. Implementations live in their respective crates.
//! This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod chat;
pub mod error;
pub mod expression;
pub mod history;
pub mod model;
pub mod reply;
pub mod store;
pub mod weight;

// Re-export key types at crate root for ergonomics
pub use chat::ChatId;
pub use error::{Error, HistoryError, ModelError, Result, StoreError};
pub use expression::{Expression, ExpressionPage, NewExpression, EXPRESSION_KIND};
pub use history::{ChatMessage, FetchOrder, MessageHistory, RenderOptions};
pub use model::{Generation, ModelClient, ModelHandle};
pub use reply::CommandReply;
pub use store::ExpressionStore;
pub use weight::DeltaOutcome;
