use opsrelay_common::FromMessage;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Persist(#[from] opsrelay_common::Error),

    #[error(transparent)]
    Watch(#[from] notify_debouncer_full::notify::Error),

    #[error("malformed {file}: {reason}")]
    Malformed { file: &'static str, reason: String },

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

    #[must_use]
    pub fn malformed(file: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            file,
            reason: reason.into(),
        }
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::message(message)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

opsrelay_common::impl_context!();
