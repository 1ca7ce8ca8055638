//! Repository records.

use serde::{Deserialize, Serialize};

use crate::{unix_now, RepoId, UserId};

/// Visibility of a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Anyone may pull, including anonymous clients.
    #[default]
    Public,
    /// Pulls are open like public; the tag is kept distinct so deployments
    /// can tell house repositories apart.
    Internal,
    /// Only the owner, admins, and members may pull.
    Private,
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Public => write!(f, "public"),
            Self::Internal => write!(f, "internal"),
            Self::Private => write!(f, "private"),
        }
    }
}

impl std::str::FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Self::Public),
            "internal" => Ok(Self::Internal),
            "private" => Ok(Self::Private),
            other => Err(format!("unknown visibility: {other}")),
        }
    }
}

/// A repository record.
///
/// The bare working directory on disk exists iff this record exists; the
/// repository store enforces that invariant at create and delete time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    /// Unique repository ID.
    pub id: RepoId,
    /// Owning user ID.
    pub owner_id: UserId,
    /// Owning username, denormalized for path addressing.
    pub owner: String,
    /// Repository name.
    pub name: String,
    /// Visibility tag.
    pub visibility: Visibility,
    /// Free-form description.
    pub description: Option<String>,
    /// Archived repositories reject every push but still serve pulls.
    pub archived: bool,
    /// Default branch; unset until the first push creates a ref.
    pub default_branch: Option<String>,
    /// Unix timestamp when created.
    pub created_at: u64,
    /// Unix timestamp when last updated.
    pub updated_at: u64,
}

impl Repository {
    /// Create a new repository record.
    pub fn new(
        id: RepoId,
        owner_id: UserId,
        owner: impl Into<String>,
        name: impl Into<String>,
        visibility: Visibility,
    ) -> Self {
        let now = unix_now();
        Self {
            id,
            owner_id,
            owner: owner.into(),
            name: name.into(),
            visibility,
            description: None,
            archived: false,
            default_branch: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A record for a bare directory found on disk with no backing store.
    ///
    /// Detached records are public for pulls and reject every push; the
    /// access predicate checks [`Repository::is_detached`] before any role
    /// or admin shortcut.
    pub fn detached(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(0, 0, owner, name, Visibility::Public)
    }

    /// Whether this is a disk-only record synthesized without a store.
    pub fn is_detached(&self) -> bool {
        self.owner_id == 0
    }

    /// Globally addressable `owner/name` form.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}
