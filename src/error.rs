//! Error types.
//!
//! `StorageError` covers the persistence layer (entity store, refcount table,
//! documents on disk). `ApiError` is what the session, the tree and the CLI
//! surface to callers; storage failures are wrapped in it unchanged.

use crate::types::Digest;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Entity not found in store: {0}")]
    EntityNotFound(Digest),

    #[error("Corrupt persisted state in {}: {reason}", path.display())]
    CorruptState { path: PathBuf, reason: String },

    #[error("Refcount invariant violated: {0}")]
    InvariantViolation(String),
}

impl StorageError {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        StorageError::CorruptState {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Errors surfaced by the public API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Path not found: {0}")]
    PathNotFound(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Not a file: {0}")]
    NotAFile(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Directory not empty: {0}")]
    DirectoryNotEmpty(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Invalid user id: {0:?}")]
    InvalidUserId(String),

    #[error("Root is not a valid store: {}", .0.display())]
    RootInvalid(PathBuf),

    #[error("Session is closed")]
    SessionClosed,

    #[error("Host path error: {0}")]
    HostPath(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    StorageError(#[from] StorageError),
}

impl ApiError {
    /// True for errors after which the in-memory session must not be committed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ApiError::StorageError(
                StorageError::EntityNotFound(_)
                    | StorageError::CorruptState { .. }
                    | StorageError::InvariantViolation(_)
            )
        )
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::StorageError(StorageError::IoError(err))
    }
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
