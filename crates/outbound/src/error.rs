use std::path::PathBuf;

use crate::command::Command;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Why a unified command could not be turned into a request.
///
/// The message is recorded verbatim in the response file, so it is written
/// for the agent to read.
#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("{command} requires '{field}' in payload")]
    MissingField {
        command: Command,
        field: &'static str,
    },

    #[error("send requires 'text' or 'path' in payload")]
    MissingContent,

    #[error("{command} is unavailable: {credential} is not configured")]
    MissingCredential {
        command: Command,
        credential: &'static str,
    },

    #[error("file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("cannot read file {}: {source}", path.display())]
    FileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("url must start with http:// or https://: {url}")]
    UnsupportedUrl { url: String },

    #[error("unsupported format '{format}' (expected markdown, html, or plain)")]
    UnsupportedFormat { format: String },
}
