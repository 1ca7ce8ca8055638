//! The forge core: every transport's shared collaborators in one place.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;
use tokio::sync::broadcast;

use bellows_audit::AuditSink;
use bellows_auth::{AccessPredicate, Identity, IdentityResolver};
use bellows_git::{GitRunner, RepoDirs};
use bellows_records::RecordStore;
use bellows_types::{AuditRecord, Repository, User, Visibility};

use crate::error::ApiError;

/// Broadcast after every successful push; the CI module subscribes here.
#[derive(Debug, Clone)]
pub struct PushEvent {
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Pushing user, when authenticated.
    pub actor: Option<String>,
}

/// Shared state behind every transport.
pub struct Forge {
    /// Record store. Empty and in-memory when no DSN is configured.
    pub records: RecordStore,
    /// True when no record store was configured: repositories found on
    /// disk are served through synthesized public records, pull-only.
    pub storeless: bool,
    /// Bare repository layout.
    pub dirs: RepoDirs,
    /// Git service runner.
    pub runner: Arc<dyn GitRunner>,
    /// Identity resolver.
    pub resolver: Arc<dyn IdentityResolver>,
    /// Access predicate.
    pub access: Arc<dyn AccessPredicate>,
    /// LFS blob store.
    pub blobs: Arc<dyn bellows_blob::BlobStore>,
    /// Audit sink.
    pub audit: Arc<dyn AuditSink>,
    /// Push-completed signal.
    pub push_events: broadcast::Sender<PushEvent>,
}

impl Forge {
    /// Resolve HTTP credentials to an identity.
    pub fn http_identity(
        &self,
        headers: &HeaderMap,
        access_token: Option<&str>,
    ) -> Option<Identity> {
        let authorization = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        self.resolver.resolve_http(authorization, access_token)
    }

    /// Resolve `owner/name` to its record and bare directory.
    ///
    /// With records configured, the record decides existence (the on-disk
    /// directory exists iff the record does). Without records, a bare
    /// directory on disk is served through a detached public record.
    pub fn resolve_repo(&self, owner: &str, name: &str) -> Option<(Repository, PathBuf)> {
        let name = name.strip_suffix(".git").unwrap_or(name);
        if let Some(repo) = self.records.repos.get(owner, name) {
            let dir = self.dirs.locate(owner, name).ok()?;
            return Some((repo, dir));
        }
        if self.storeless {
            let dir = self.dirs.find(owner, name)?;
            return Some((Repository::detached(owner, name), dir));
        }
        None
    }

    /// Authorize a pull, hiding private repositories from the denied.
    pub fn authorize_pull(
        &self,
        user: Option<&User>,
        repo: &Repository,
    ) -> Result<(), ApiError> {
        if self.access.can_pull(user, repo) {
            return Ok(());
        }
        if repo.visibility == Visibility::Private {
            return Err(ApiError::NotFound);
        }
        if user.is_none() {
            Err(ApiError::Unauthorized)
        } else {
            Err(ApiError::Forbidden)
        }
    }

    /// Authorize a push. Anonymous callers get a credential challenge
    /// before the repository's existence is decided.
    pub fn authorize_push(
        &self,
        user: Option<&User>,
        repo: &Repository,
    ) -> Result<(), ApiError> {
        let Some(user) = user else {
            return Err(ApiError::Unauthorized);
        };
        if self.access.can_push(Some(user), repo) {
            return Ok(());
        }
        if repo.visibility == Visibility::Private && !self.access.can_pull(Some(user), repo) {
            return Err(ApiError::NotFound);
        }
        Err(ApiError::Forbidden)
    }

    /// LFS upload authorization: denial for a caller who can see the
    /// repository is a credential problem (401), which LFS clients handle
    /// by re-authenticating.
    pub fn authorize_lfs_upload(
        &self,
        user: Option<&User>,
        repo: &Repository,
    ) -> Result<(), ApiError> {
        if user.is_none() {
            return Err(ApiError::Unauthorized);
        }
        if self.access.can_push(user, repo) {
            return Ok(());
        }
        if repo.visibility == Visibility::Private && !self.access.can_pull(user, repo) {
            return Err(ApiError::NotFound);
        }
        Err(ApiError::Unauthorized)
    }

    /// Append an audit record, best effort.
    pub async fn emit_audit(&self, record: AuditRecord) {
        bellows_audit::emit(self.audit.as_ref(), record).await;
    }

    /// Post-push bookkeeping: set the default branch on the first ref, and
    /// signal subscribers.
    pub async fn push_finished(&self, repo: &Repository, actor: Option<&User>) {
        if repo.id != 0 && repo.default_branch.is_none() {
            if let Some(current) = self.records.repos.get_by_id(repo.id) {
                if current.default_branch.is_none() {
                    if let Some(branch) = self.pick_default_branch(repo).await {
                        let mut updated = current;
                        updated.default_branch = Some(branch.clone());
                        match self.records.repos.update(updated) {
                            Ok(_) => {
                                tracing::info!(
                                    repo = %repo.full_name(),
                                    branch = %branch,
                                    "default branch set on first push"
                                );
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "failed to persist default branch");
                            }
                        }
                    }
                }
            }
        }

        let _ = self.push_events.send(PushEvent {
            owner: repo.owner.clone(),
            repo: repo.name.clone(),
            actor: actor.map(|u| u.username.clone()),
        });
    }

    async fn pick_default_branch(&self, repo: &Repository) -> Option<String> {
        let dir = self.dirs.locate(&repo.owner, &repo.name).ok()?;
        let branches = bellows_git::branches(&dir).await.ok()?;
        if branches.is_empty() {
            return None;
        }
        if let Some(head) = bellows_git::head_branch(&dir).await {
            if branches.iter().any(|b| b.name == head) {
                return Some(head);
            }
        }
        branches.first().map(|b| b.name.clone())
    }
}

#[async_trait]
impl bellows_ssh::ForgeServices for Forge {
    fn identity_for_fingerprint(&self, fingerprint: &str) -> Option<Identity> {
        self.resolver.resolve_ssh_fingerprint(fingerprint)
    }

    fn resolve_repo(&self, owner: &str, name: &str) -> Option<(Repository, PathBuf)> {
        Forge::resolve_repo(self, owner, name)
    }

    fn can_pull(&self, user: Option<&User>, repo: &Repository) -> bool {
        self.access.can_pull(user, repo)
    }

    fn can_push(&self, user: Option<&User>, repo: &Repository) -> bool {
        self.access.can_push(user, repo)
    }

    fn runner(&self) -> Arc<dyn GitRunner> {
        self.runner.clone()
    }

    async fn push_completed(&self, repo: &Repository, actor: &User) {
        self.push_finished(repo, Some(actor)).await;
    }

    async fn audit(&self, record: AuditRecord) {
        self.emit_audit(record).await;
    }
}
