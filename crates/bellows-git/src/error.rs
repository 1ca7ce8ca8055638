//! Git plumbing error types.

use thiserror::Error;

/// Errors that can occur while running Git services.
#[derive(Debug, Error)]
pub enum GitError {
    /// A service name other than the two Git transports.
    #[error("unknown git service: {0}")]
    UnknownService(String),

    /// Owner or repository segment failed validation.
    #[error("invalid repository path: {0}")]
    InvalidPath(String),

    /// Repository, ref, or path does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The git child process could not be started.
    #[error("failed to spawn git: {0}")]
    Spawn(std::io::Error),

    /// The git child process exited non-zero. The stderr text goes to the
    /// server log, never to the client body.
    #[error("git exited with status {status}: {stderr}")]
    Upstream {
        /// Child exit status.
        status: i32,
        /// Captured stderr.
        stderr: String,
    },

    /// I/O error while streaming.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
