//! # Parlance Commands
//!
//! The textual command surface: an ordered pattern table parses one line of
//! user text into a typed intent, the resolver normalizes chat references,
//! and the executor runs the intent against the store, history, and model
//! collaborators, always returning the tri-state [`parlance_core::CommandReply`].

pub mod executor;
pub mod parser;
pub mod resolver;

pub use executor::{CommandContext, CommandExecutor, ReviewSettings};
pub use parser::{Command, CommandParser};
pub use resolver::{canonicalize, resolve_chat_ref};
