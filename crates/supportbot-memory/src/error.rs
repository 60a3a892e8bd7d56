use std::path::PathBuf;

use crate::document::DocumentError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("the file {} does not exist", .0.display())]
    NotFound(PathBuf),

    #[error("embedding store is not initialized; build or load the index first")]
    Uninitialized,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("embedding request failed: {0}")]
    Embedding(#[from] supportbot_llm::LlmError),

    #[error("query vector has {actual} dimensions, index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("database error: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt index: {0}")]
    Corrupt(String),

    #[error("integer conversion: {0}")]
    IntConversion(#[from] std::num::TryFromIntError),
}

impl From<DocumentError> for StoreError {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::NotFound(path) => Self::NotFound(path),
            DocumentError::Io(e) => Self::Io(e),
            DocumentError::FileTooLarge(size) => {
                Self::InvalidInput(format!("corpus file too large: {size} bytes"))
            }
        }
    }
}
