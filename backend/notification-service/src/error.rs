use thiserror::Error;

pub type DispatchResult<T> = Result<T, DispatchError>;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl DispatchError {
    pub fn is_transient(&self) -> bool {
        !matches!(self, DispatchError::Serialization(_))
    }
}
