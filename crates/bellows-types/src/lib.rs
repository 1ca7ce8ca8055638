//! Core data model for the Bellows forge.
//!
//! These types are shared by every transport and store: users and their
//! credentials, repositories and their members, and the append-only audit
//! record. The record store owns persistence; this crate is pure data.

mod audit;
mod key;
mod member;
mod repository;
mod token;
mod user;
mod validate;

pub use audit::{AuditAction, AuditRecord};
pub use key::SshKey;
pub use member::{RepoMember, RepoRole};
pub use repository::{Repository, Visibility};
pub use token::Token;
pub use user::{User, UserRole};
pub use validate::{validate_repo_name, validate_username, NameError};

/// Unique identifier for a user.
pub type UserId = u64;

/// Unique identifier for an SSH key.
pub type SshKeyId = u64;

/// Unique identifier for a personal access token.
pub type TokenId = u64;

/// Unique identifier for a repository.
pub type RepoId = u64;

/// Current unix timestamp in seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
