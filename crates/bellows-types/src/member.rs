//! Repository membership.

use serde::{Deserialize, Serialize};

use crate::{unix_now, RepoId, UserId};

/// Role granted to a repository member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoRole {
    /// Read-only access to private repositories.
    Viewer,
    /// Pull and push.
    Developer,
    /// Pull and push; reserved for future settings control.
    Maintainer,
}

impl RepoRole {
    /// Whether this role grants push.
    pub fn can_push(&self) -> bool {
        matches!(self, Self::Developer | Self::Maintainer)
    }
}

impl std::fmt::Display for RepoRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Viewer => write!(f, "viewer"),
            Self::Developer => write!(f, "developer"),
            Self::Maintainer => write!(f, "maintainer"),
        }
    }
}

impl std::str::FromStr for RepoRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "viewer" => Ok(Self::Viewer),
            "developer" => Ok(Self::Developer),
            "maintainer" => Ok(Self::Maintainer),
            other => Err(format!("unknown repository role: {other}")),
        }
    }
}

/// Membership of one user in one repository, unique by `(repo, user)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoMember {
    /// Repository.
    pub repo_id: RepoId,
    /// Member user.
    pub user_id: UserId,
    /// Granted role.
    pub role: RepoRole,
    /// Unix timestamp when granted.
    pub created_at: u64,
}

impl RepoMember {
    /// Create a membership row.
    pub fn new(repo_id: RepoId, user_id: UserId, role: RepoRole) -> Self {
        Self {
            repo_id,
            user_id,
            role,
            created_at: unix_now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_starts_at_developer() {
        assert!(!RepoRole::Viewer.can_push());
        assert!(RepoRole::Developer.can_push());
        assert!(RepoRole::Maintainer.can_push());
    }

    #[test]
    fn roles_order_by_privilege() {
        assert!(RepoRole::Viewer < RepoRole::Developer);
        assert!(RepoRole::Developer < RepoRole::Maintainer);
    }
}
