use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Conversation not found: {name}")]
    NotFound { name: String },
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;
