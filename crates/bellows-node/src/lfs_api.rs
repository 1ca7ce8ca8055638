//! Git-LFS batch transport and object endpoints.

use std::collections::HashMap;

use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};

use bellows_blob::BlobKey;
use bellows_types::{AuditAction, AuditRecord, Repository, User};

use crate::error::ApiError;
use crate::AppState;

const LFS_MEDIA_TYPE: &str = "application/vnd.git-lfs+json";

/// LFS batch negotiation and object transfer routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/{owner}/{repo}/objects/batch", post(batch))
        .route("/{owner}/{repo}/objects/{oid}", get(download).put(upload))
}

#[derive(Debug, Deserialize)]
struct BatchRequest {
    operation: String,
    objects: Vec<ObjectSpec>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct ObjectSpec {
    oid: String,
    size: u64,
}

#[derive(Debug, Serialize)]
struct BatchResponse {
    transfer: &'static str,
    objects: Vec<ObjectResponse>,
}

#[derive(Debug, Serialize)]
struct ObjectResponse {
    oid: String,
    size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    authenticated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    actions: Option<HashMap<&'static str, ObjectAction>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ObjectError>,
}

#[derive(Debug, Serialize)]
struct ObjectAction {
    href: String,
}

#[derive(Debug, Serialize)]
struct ObjectError {
    code: u16,
    message: String,
}

/// LFS OIDs are lowercase hex SHA-256.
fn is_valid_oid(oid: &str) -> bool {
    oid.len() == 64
        && oid
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

fn object_href(repo: &Repository, oid: &str) -> String {
    format!("/{}/{}/objects/{oid}", repo.owner, repo.name)
}

fn lfs_json<T: Serialize>(status: StatusCode, body: &T) -> Response {
    let encoded = serde_json::to_vec(body).unwrap_or_default();
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, LFS_MEDIA_TYPE)
        .body(Body::from(encoded))
        .expect("static response parts")
}

/// `POST /<owner>/<repo>/objects/batch`
async fn batch(
    State(state): State<AppState>,
    Path((owner, repo_name)): Path<(String, String)>,
    headers: HeaderMap,
    Json(request): Json<BatchRequest>,
) -> Result<Response, ApiError> {
    let identity = state.forge.http_identity(&headers, None);

    let (repo, user) = match request.operation.as_str() {
        "download" => {
            let (repo, _) = state
                .forge
                .resolve_repo(&owner, &repo_name)
                .ok_or(ApiError::NotFound)?;
            let user = identity.as_ref().and_then(|i| i.user_for(&repo)).cloned();
            state.forge.authorize_pull(user.as_ref(), &repo)?;
            (repo, user)
        }
        "upload" => {
            let identity = identity.ok_or(ApiError::Unauthorized)?;
            let (repo, _) = state
                .forge
                .resolve_repo(&owner, &repo_name)
                .ok_or(ApiError::NotFound)?;
            let user = identity.user_for(&repo).cloned();
            state.forge.authorize_lfs_upload(user.as_ref(), &repo)?;
            (repo, user)
        }
        other => {
            return Err(ApiError::BadRequest(format!(
                "unknown batch operation: {other}"
            )))
        }
    };

    let download = request.operation == "download";
    let mut objects = Vec::with_capacity(request.objects.len());
    for spec in request.objects {
        objects.push(object_response(&state, &repo, spec, download, user.is_some()).await);
    }

    state
        .forge
        .emit_audit(
            audit_base(AuditAction::LfsBatch, &repo, user.as_ref(), &headers).metadata(
                serde_json::json!({
                    "operation": request.operation,
                    "objects": objects.len(),
                }),
            ),
        )
        .await;

    Ok(lfs_json(
        StatusCode::OK,
        &BatchResponse {
            transfer: "basic",
            objects,
        },
    ))
}

async fn object_response(
    state: &AppState,
    repo: &Repository,
    spec: ObjectSpec,
    download: bool,
    authenticated: bool,
) -> ObjectResponse {
    if !is_valid_oid(&spec.oid) {
        return ObjectResponse {
            oid: spec.oid,
            size: spec.size,
            authenticated: None,
            actions: None,
            error: Some(ObjectError {
                code: 422,
                message: "invalid oid".to_string(),
            }),
        };
    }

    if download {
        let key = BlobKey::new(&repo.owner, &repo.name, &spec.oid);
        match state.forge.blobs.exists(&key).await {
            Ok(true) => {}
            Ok(false) => {
                return ObjectResponse {
                    oid: spec.oid,
                    size: spec.size,
                    authenticated: None,
                    actions: None,
                    error: Some(ObjectError {
                        code: 404,
                        message: "object does not exist".to_string(),
                    }),
                };
            }
            Err(e) => {
                tracing::warn!(error = %e, oid = %spec.oid, "blob existence check failed");
                return ObjectResponse {
                    oid: spec.oid,
                    size: spec.size,
                    authenticated: None,
                    actions: None,
                    error: Some(ObjectError {
                        code: 500,
                        message: "storage unavailable".to_string(),
                    }),
                };
            }
        }
    }

    let action = if download { "download" } else { "upload" };
    let href = object_href(repo, &spec.oid);
    ObjectResponse {
        oid: spec.oid,
        size: spec.size,
        authenticated: authenticated.then_some(true),
        actions: Some(HashMap::from([(action, ObjectAction { href })])),
        error: None,
    }
}

fn audit_base(
    action: AuditAction,
    repo: &Repository,
    user: Option<&User>,
    headers: &HeaderMap,
) -> AuditRecord {
    let mut record = AuditRecord::new(action).actor(user.map(|u| u.id));
    if repo.id != 0 {
        record = record.repo(repo.id);
    }
    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        record = record.ip(forwarded.to_string());
    }
    record
}

/// `GET /<owner>/<repo>/objects/<oid>`
async fn download(
    State(state): State<AppState>,
    Path((owner, repo_name, oid)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if !is_valid_oid(&oid) {
        return Err(ApiError::NotFound);
    }
    let identity = state.forge.http_identity(&headers, None);
    let (repo, _) = state
        .forge
        .resolve_repo(&owner, &repo_name)
        .ok_or(ApiError::NotFound)?;
    let user = identity.as_ref().and_then(|i| i.user_for(&repo)).cloned();
    state.forge.authorize_pull(user.as_ref(), &repo)?;

    let key = BlobKey::new(&repo.owner, &repo.name, &oid);
    let stream = state.forge.blobs.get(&key).await?;

    state
        .forge
        .emit_audit(
            audit_base(AuditAction::LfsDownload, &repo, user.as_ref(), &headers)
                .metadata(serde_json::json!({ "oid": oid })),
        )
        .await;

    Ok(Response::builder()
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .body(Body::from_stream(stream))
        .expect("static response parts"))
}

/// `PUT /<owner>/<repo>/objects/<oid>`
async fn upload(
    State(state): State<AppState>,
    Path((owner, repo_name, oid)): Path<(String, String, String)>,
    request: Request,
) -> Result<Response, ApiError> {
    if !is_valid_oid(&oid) {
        return Err(ApiError::BadRequest("invalid oid".into()));
    }
    let identity = state
        .forge
        .http_identity(request.headers(), None)
        .ok_or(ApiError::Unauthorized)?;
    let (repo, _) = state
        .forge
        .resolve_repo(&owner, &repo_name)
        .ok_or(ApiError::NotFound)?;
    let user = identity.user_for(&repo).cloned();
    state.forge.authorize_lfs_upload(user.as_ref(), &repo)?;

    let headers = request.headers().clone();
    let key = BlobKey::new(&repo.owner, &repo.name, &oid);
    let stream: bellows_blob::ByteStream = Box::pin(
        request
            .into_body()
            .into_data_stream()
            .map_err(std::io::Error::other),
    );
    state.forge.blobs.put(&key, stream).await?;

    state
        .forge
        .emit_audit(
            audit_base(AuditAction::LfsUpload, &repo, user.as_ref(), &headers)
                .metadata(serde_json::json!({ "oid": oid })),
        )
        .await;

    Ok(StatusCode::OK.into_response())
}
