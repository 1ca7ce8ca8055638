//! The two Git transport services.

use crate::{GitError, Result};

/// Exactly the two services a Git server runs; anything else is rejected
/// before a process is spawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitService {
    /// `git-upload-pack`: fetch and clone (read).
    UploadPack,
    /// `git-receive-pack`: push (write).
    ReceivePack,
}

impl GitService {
    /// Parse a wire service name.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "git-upload-pack" => Ok(Self::UploadPack),
            "git-receive-pack" => Ok(Self::ReceivePack),
            other => Err(GitError::UnknownService(other.to_string())),
        }
    }

    /// Wire name, as it appears in URLs and `# service=` preludes.
    pub fn name(&self) -> &'static str {
        match self {
            Self::UploadPack => "git-upload-pack",
            Self::ReceivePack => "git-receive-pack",
        }
    }

    /// Subcommand passed to the `git` binary.
    pub fn subcommand(&self) -> &'static str {
        match self {
            Self::UploadPack => "upload-pack",
            Self::ReceivePack => "receive-pack",
        }
    }

    /// Whether this service writes to the repository.
    pub fn is_write(&self) -> bool {
        matches!(self, Self::ReceivePack)
    }
}

impl std::fmt::Display for GitService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
