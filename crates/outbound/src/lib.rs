//! Outbound half of the relay: turns queued agent commands into HTTP calls.
//!
//! [`translate::Translator`] maps `send` / `search` / `read` commands onto the
//! chat and search APIs, [`rules::UrlRules`] gates raw pass-through requests,
//! [`executor::Executor`] performs the call under size and time limits, and
//! [`sanitize`] trims search/read results into an agent-safe summary.

pub mod command;
pub mod error;
pub mod executor;
pub mod rules;
pub mod sanitize;
pub mod translate;

pub use {
    command::{Attachment, Command, ConcreteRequest, MessageFormat},
    error::{Error, Result, TranslateError},
    executor::{Executor, ExecutorLimits},
    rules::{RuleViolation, UrlRules},
    translate::Translator,
};
