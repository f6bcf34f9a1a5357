//! Shared types, error definitions, and file helpers used across all opsrelay crates.

pub mod error;
pub mod fs;
pub mod types;

pub use error::{Error, FromMessage, Result};
