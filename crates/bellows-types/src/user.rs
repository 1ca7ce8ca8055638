//! User accounts.

use serde::{Deserialize, Serialize};

use crate::{unix_now, UserId};

/// Role tag carried by every user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Site administrator; bypasses repository role checks.
    Admin,
    /// Regular account.
    #[default]
    User,
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::User => write!(f, "user"),
        }
    }
}

/// A user account.
///
/// Accounts are created by the external user module; the transports only
/// ever read them. A disabled account authenticates via no method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// Unique username (lowercase, alphanumeric with hyphens).
    pub username: String,
    /// Email address.
    pub email: String,
    /// Site-wide role.
    pub role: UserRole,
    /// Disabled accounts keep their rows but lose every credential.
    pub disabled: bool,
    /// Unix timestamp when created.
    pub created_at: u64,
    /// Unix timestamp when last updated.
    pub updated_at: u64,
}

impl User {
    /// Create a new active user with the default role.
    pub fn new(id: UserId, username: impl Into<String>, email: impl Into<String>) -> Self {
        let now = unix_now();
        Self {
            id,
            username: username.into(),
            email: email.into(),
            role: UserRole::User,
            disabled: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this user carries the admin role.
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}
