//! Record store error types.

use thiserror::Error;

/// Result type for record store operations.
pub type Result<T> = std::result::Result<T, RecordError>;

/// Errors that can occur in the record store.
#[derive(Debug, Error)]
pub enum RecordError {
    /// User not found.
    #[error("user not found: {0}")]
    UserNotFound(String),

    /// Username already exists.
    #[error("username already exists: {0}")]
    UsernameExists(String),

    /// Repository not found.
    #[error("repository not found: {0}")]
    RepoNotFound(String),

    /// Repository already exists.
    #[error("repository already exists: {0}")]
    RepoExists(String),

    /// SSH key already registered (duplicate fingerprint).
    #[error("SSH key already exists with fingerprint: {0}")]
    SshKeyExists(String),

    /// Token not found.
    #[error("token not found")]
    TokenNotFound,

    /// Name validation failed.
    #[error("invalid name: {0}")]
    InvalidName(#[from] bellows_types::NameError),

    /// Persistence layer failure.
    #[error("record persistence error: {0}")]
    Persistence(String),
}
