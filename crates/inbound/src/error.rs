#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    Persist(#[from] opsrelay_common::Error),

    #[error("platform rejected request: {description}")]
    Rejected { description: String },
}

pub type Result<T> = std::result::Result<T, Error>;
