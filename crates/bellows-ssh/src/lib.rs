//! SSH transport for the Bellows forge.
//!
//! A session moves through `Connected → Authenticated → CommandAccepted →
//! Serving → Closed`. Authentication is public-key only: the offered key's
//! fingerprint resolves a user or the session is rejected. The only
//! accepted channel request is `exec` with a payload of the form
//! `git-upload-pack '/owner/repo.git'`; everything else ends the channel
//! with exit status 1.

mod command;
mod hostkey;
mod server;

pub use command::{parse_git_command, GitCommand};
pub use hostkey::load_or_generate_host_key;
pub use server::{run, ForgeServices, SshConfig, SshTransport};

use thiserror::Error;

/// Errors raised by the SSH transport.
#[derive(Debug, Error)]
pub enum SshError {
    /// Protocol-level failure from the SSH library.
    #[error("ssh protocol error: {0}")]
    Protocol(#[from] russh::Error),

    /// Host key could not be loaded or generated.
    #[error("host key error: {0}")]
    HostKey(String),

    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for the SSH transport.
pub type Result<T> = std::result::Result<T, SshError>;
