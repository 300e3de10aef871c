//! Error types for ano-storage

use ano_core::AnonError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found in cache: {0}")]
    NotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<StorageError> for AnonError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(path) => AnonError::FileNotFound(path),
            StorageError::InvalidPath(path) => AnonError::FileNotFound(path),
            other => AnonError::Storage(Box::new(other)),
        }
    }
}
