use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("manifest not found for file_id {0}")]
    ManifestNotFound(String),

    #[error("illegal status transition for {file_id}: {from} -> {to}")]
    IllegalTransition {
        file_id: String,
        from: String,
        to: String,
    },

    #[error("invalid priority value: {0}")]
    InvalidPriority(String),

    #[error("invalid status value: {0}")]
    InvalidStatus(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
