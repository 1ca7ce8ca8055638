//! Personal access token rows.

use serde::{Deserialize, Serialize};

use crate::{unix_now, TokenId, UserId};

/// A personal access token.
///
/// Only the SHA-256 hash of the raw value is persisted; the raw token is
/// shown once at creation and never stored. Revocation is monotonic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    /// Unique token ID.
    pub id: TokenId,
    /// Owning user.
    pub user_id: UserId,
    /// User-provided name.
    pub name: String,
    /// Lowercase hex SHA-256 of the raw token value.
    pub token_hash: String,
    /// Repositories (`owner/name`) this token may reach; empty means all
    /// repositories the owner can reach.
    pub scopes: Vec<String>,
    /// Optional expiry timestamp.
    pub expires_at: Option<u64>,
    /// Revoked tokens never authenticate again.
    pub revoked: bool,
    /// Unix timestamp when created.
    pub created_at: u64,
    /// Last time the token authenticated a request.
    pub last_used_at: Option<u64>,
}

impl Token {
    /// Create a new live token row from a precomputed hash.
    pub fn new(
        id: TokenId,
        user_id: UserId,
        name: impl Into<String>,
        token_hash: impl Into<String>,
    ) -> Self {
        Self {
            id,
            user_id,
            name: name.into(),
            token_hash: token_hash.into(),
            scopes: Vec::new(),
            expires_at: None,
            revoked: false,
            created_at: unix_now(),
            last_used_at: None,
        }
    }

    /// Whether the token has passed its expiry timestamp.
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    /// Whether the token may reach the given `owner/name` repository.
    pub fn permits_repo(&self, full_name: &str) -> bool {
        self.scopes.is_empty() || self.scopes.iter().any(|s| s == full_name)
    }
}
