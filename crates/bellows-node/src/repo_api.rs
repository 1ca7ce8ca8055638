//! Repository lifecycle boundary and the health probe.
//!
//! Create and delete are the two operations that must keep the record and
//! the on-disk directory in lockstep: record before disk on create, disk
//! before record on delete. A partial failure can leave an orphaned
//! directory, never an orphaned record.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use bellows_types::{AuditAction, AuditRecord, Repository, Visibility};

use crate::error::ApiError;
use crate::AppState;

/// Repository CRUD and health routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/repos", get(list_repos).post(create_repo))
        .route(
            "/api/repos/{owner}/{repo}",
            get(get_repo).delete(delete_repo),
        )
}

/// Repository view returned by the API.
#[derive(Debug, Serialize)]
pub struct RepoView {
    /// Owner username.
    pub owner: String,
    /// Repository name.
    pub name: String,
    /// `owner/name`.
    pub full_name: String,
    /// Visibility tag.
    pub visibility: Visibility,
    /// Description.
    pub description: Option<String>,
    /// Archived flag.
    pub archived: bool,
    /// Default branch, unset until the first push.
    pub default_branch: Option<String>,
    /// Unix timestamp when created.
    pub created_at: u64,
}

impl From<&Repository> for RepoView {
    fn from(repo: &Repository) -> Self {
        Self {
            owner: repo.owner.clone(),
            name: repo.name.clone(),
            full_name: repo.full_name(),
            visibility: repo.visibility,
            description: repo.description.clone(),
            archived: repo.archived,
            default_branch: repo.default_branch.clone(),
            created_at: repo.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreateRepoRequest {
    name: String,
    #[serde(default)]
    visibility: Visibility,
    #[serde(default)]
    description: Option<String>,
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// `GET /api/repos`: repositories the caller may pull.
async fn list_repos(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Json<Vec<RepoView>> {
    let identity = state.forge.http_identity(&headers, None);

    let mut visible: Vec<RepoView> = if state.forge.storeless {
        state
            .forge
            .dirs
            .scan()
            .into_iter()
            .map(|(owner, name)| RepoView::from(&Repository::detached(owner, name)))
            .collect()
    } else {
        state
            .forge
            .records
            .repos
            .list()
            .iter()
            .filter(|repo| {
                let user = identity.as_ref().and_then(|i| i.user_for(repo));
                state.forge.access.can_pull(user, repo)
            })
            .map(RepoView::from)
            .collect()
    };
    visible.sort_by(|a, b| a.full_name.cmp(&b.full_name));
    Json(visible)
}

/// `GET /api/repos/{owner}/{repo}`
async fn get_repo(
    State(state): State<AppState>,
    Path((owner, repo_name)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<RepoView>, ApiError> {
    let identity = state.forge.http_identity(&headers, None);
    let (repo, _) = state
        .forge
        .resolve_repo(&owner, &repo_name)
        .ok_or(ApiError::NotFound)?;
    let user = identity.as_ref().and_then(|i| i.user_for(&repo));
    state.forge.authorize_pull(user, &repo)?;
    Ok(Json(RepoView::from(&repo)))
}

/// `POST /api/repos`: record first, then the bare directory; a failed
/// init rolls the record back.
async fn create_repo(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateRepoRequest>,
) -> Result<(StatusCode, Json<RepoView>), ApiError> {
    let identity = state
        .forge
        .http_identity(&headers, None)
        .ok_or(ApiError::Unauthorized)?;
    let owner = identity.user;

    let repo = state
        .forge
        .records
        .repos
        .create(&owner, &request.name, request.visibility)?;
    let repo = match request.description {
        Some(description) => {
            let mut repo = repo;
            repo.description = Some(description);
            state.forge.records.repos.update(repo)?
        }
        None => repo,
    };

    if let Err(e) = state.forge.dirs.ensure(&repo.owner, &repo.name).await {
        if let Err(rollback) = state.forge.records.repos.remove(repo.id) {
            tracing::error!(error = %rollback, repo = %repo.full_name(), "rollback after failed init also failed");
        }
        return Err(e.into());
    }

    state
        .forge
        .emit_audit(
            AuditRecord::new(AuditAction::RepoCreated)
                .actor(Some(owner.id))
                .repo(repo.id)
                .metadata(serde_json::json!({ "path": repo.full_name() })),
        )
        .await;

    Ok((StatusCode::CREATED, Json(RepoView::from(&repo))))
}

/// `DELETE /api/repos/{owner}/{repo}`: disk first, then the record.
async fn delete_repo(
    State(state): State<AppState>,
    Path((owner, repo_name)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let identity = state
        .forge
        .http_identity(&headers, None)
        .ok_or(ApiError::Unauthorized)?;
    let (repo, _) = state
        .forge
        .resolve_repo(&owner, &repo_name)
        .ok_or(ApiError::NotFound)?;

    let user = identity.user_for(&repo);
    let allowed = user.is_some_and(|u| u.is_admin() || u.id == repo.owner_id);
    if !allowed {
        state.forge.authorize_pull(user, &repo)?;
        return Err(ApiError::Forbidden);
    }
    if repo.id == 0 {
        // Detached disk repositories have no record to delete through.
        return Err(ApiError::Forbidden);
    }

    state.forge.dirs.remove(&repo.owner, &repo.name).await?;
    state.forge.records.members.remove_repo(repo.id)?;
    state.forge.records.repos.remove(repo.id)?;

    state
        .forge
        .emit_audit(
            AuditRecord::new(AuditAction::RepoDeleted)
                .actor(identity.user_for(&repo).map(|u| u.id))
                .repo(repo.id)
                .metadata(serde_json::json!({ "path": repo.full_name() })),
        )
        .await;

    Ok(StatusCode::NO_CONTENT)
}
