//! JSON read API over repository contents.
//!
//! All views shell out to `git` through `bellows-git`; a URL like
//! `/api/repos/a/p/tree/feature/x/src` is split into ref and path by
//! greedy ref resolution, so branch names containing `/` work.

use std::path::PathBuf;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};

use crate::error::ApiError;
use crate::AppState;

/// Read API routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/repos/{owner}/{repo}/tree/{*rest}", get(tree_view))
        .route("/api/repos/{owner}/{repo}/blob/{*rest}", get(blob_view))
        .route(
            "/api/repos/{owner}/{repo}/commits/{*rest}",
            get(commits_view),
        )
        .route("/api/repos/{owner}/{repo}/branches", get(branches_view))
        .route("/api/repos/{owner}/{repo}/diff/{sha}", get(diff_view))
        .route("/api/repos/{owner}/{repo}/blame/{*rest}", get(blame_view))
}

/// Blobs up to this size come back as a JSON string; larger or non-UTF-8
/// content streams as raw bytes.
const INLINE_BLOB_LIMIT: usize = 1024 * 1024;

async fn readable_repo_dir(
    state: &AppState,
    owner: &str,
    repo_name: &str,
    headers: &HeaderMap,
) -> Result<PathBuf, ApiError> {
    let identity = state.forge.http_identity(headers, None);
    let (repo, dir) = state
        .forge
        .resolve_repo(owner, repo_name)
        .ok_or(ApiError::NotFound)?;
    let user = identity.as_ref().and_then(|i| i.user_for(&repo));
    state.forge.authorize_pull(user, &repo)?;
    Ok(dir)
}

fn split_segments(rest: &str) -> Vec<String> {
    rest.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

async fn resolve(dir: &PathBuf, rest: &str) -> Result<(String, String), ApiError> {
    let segments = split_segments(rest);
    if segments.is_empty() {
        return Err(ApiError::BadRequest("missing ref".into()));
    }
    bellows_git::resolve_ref_path(dir, &segments)
        .await
        .ok_or(ApiError::NotFound)
}

async fn tree_view(
    State(state): State<AppState>,
    Path((owner, repo_name, rest)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<Json<Vec<bellows_git::TreeEntry>>, ApiError> {
    let dir = readable_repo_dir(&state, &owner, &repo_name, &headers).await?;
    let (reference, path) = resolve(&dir, &rest).await?;
    Ok(Json(bellows_git::tree(&dir, &reference, &path).await?))
}

async fn blob_view(
    State(state): State<AppState>,
    Path((owner, repo_name, rest)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let dir = readable_repo_dir(&state, &owner, &repo_name, &headers).await?;
    let (reference, path) = resolve(&dir, &rest).await?;
    if path.is_empty() {
        return Err(ApiError::BadRequest("missing file path".into()));
    }
    let content = bellows_git::blob(&dir, &reference, &path).await?;

    if content.len() <= INLINE_BLOB_LIMIT {
        if let Ok(text) = String::from_utf8(content.clone()) {
            return Ok(Json(text).into_response());
        }
    }
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .body(Body::from(content))
        .expect("static response parts"))
}

async fn commits_view(
    State(state): State<AppState>,
    Path((owner, repo_name, rest)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<Json<Vec<bellows_git::CommitInfo>>, ApiError> {
    let dir = readable_repo_dir(&state, &owner, &repo_name, &headers).await?;
    let (reference, path) = resolve(&dir, &rest).await?;
    Ok(Json(bellows_git::commits(&dir, &reference, &path).await?))
}

async fn branches_view(
    State(state): State<AppState>,
    Path((owner, repo_name)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<Vec<bellows_git::BranchInfo>>, ApiError> {
    let dir = readable_repo_dir(&state, &owner, &repo_name, &headers).await?;
    Ok(Json(bellows_git::branches(&dir).await?))
}

async fn diff_view(
    State(state): State<AppState>,
    Path((owner, repo_name, sha)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let dir = readable_repo_dir(&state, &owner, &repo_name, &headers).await?;
    let patch = bellows_git::diff(&dir, &sha).await?;
    Ok(Response::builder()
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from(patch))
        .expect("static response parts"))
}

async fn blame_view(
    State(state): State<AppState>,
    Path((owner, repo_name, rest)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<Json<Vec<bellows_git::BlameLine>>, ApiError> {
    let dir = readable_repo_dir(&state, &owner, &repo_name, &headers).await?;
    let (reference, path) = resolve(&dir, &rest).await?;
    if path.is_empty() {
        return Err(ApiError::BadRequest("missing file path".into()));
    }
    Ok(Json(bellows_git::blame(&dir, &reference, &path).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_drop_empty_components() {
        assert_eq!(split_segments("a/b/c"), vec!["a", "b", "c"]);
        assert_eq!(split_segments("/a//b/"), vec!["a", "b"]);
        assert!(split_segments("").is_empty());
    }
}
