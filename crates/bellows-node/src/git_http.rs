//! Smart-HTTP Git transport, with the dumb-protocol file fallback.

use std::path::{Path as FsPath, PathBuf};

use axum::body::Body;
use axum::extract::{ConnectInfo, Path, Query, Request, State};
use axum::http::{header, HeaderMap};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use futures::TryStreamExt;
use serde::Deserialize;
use tokio_util::io::ReaderStream;

use bellows_git::{GitService, ServeOptions, ServeOutcome};
use bellows_types::{AuditAction, AuditRecord, Repository, User};

use crate::error::ApiError;
use crate::AppState;

/// Smart and dumb Git-over-HTTP routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/{owner}/{repo}/info/refs", get(info_refs))
        .route("/{owner}/{repo}/git-upload-pack", post(upload_pack))
        .route("/{owner}/{repo}/git-receive-pack", post(receive_pack))
        // Dumb-protocol fallback: raw files out of the repository.
        .route("/{owner}/{repo}/HEAD", get(head_file))
        .route("/{owner}/{repo}/objects/info/packs", get(info_packs))
        // Shares the `{oid}` parameter node with the LFS object routes.
        .route("/{owner}/{repo}/objects/{oid}/{tail}", get(loose_object))
        .route("/{owner}/{repo}/objects/pack/{file}", get(pack_file))
        .route("/{owner}/{repo}/refs/heads/{*name}", get(branch_ref))
        .route("/{owner}/{repo}/refs/tags/{*name}", get(tag_ref))
}

#[derive(Debug, Deserialize)]
struct GitQuery {
    service: Option<String>,
    access_token: Option<String>,
}

/// First entry of `X-Forwarded-For`, else the socket peer.
fn client_ip(headers: &HeaderMap, request: Option<&Request>) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return Some(first.to_string());
            }
        }
    }
    request
        .and_then(|r| r.extensions().get::<ConnectInfo<std::net::SocketAddr>>())
        .map(|info| info.0.ip().to_string())
}

fn git_response(content_type: &str, body: Body) -> Response {
    Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::PRAGMA, "no-cache")
        .body(body)
        .expect("static response parts")
}

/// `GET /<owner>/<repo>/info/refs?service=git-upload-pack|git-receive-pack`
async fn info_refs(
    State(state): State<AppState>,
    Path((owner, repo_name)): Path<(String, String)>,
    Query(query): Query<GitQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let service_name = query
        .service
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("service query parameter required".into()))?;
    let service = GitService::from_name(service_name)?;

    let identity = state
        .forge
        .http_identity(&headers, query.access_token.as_deref());

    let dir = match service {
        GitService::UploadPack => {
            let (repo, dir) = state
                .forge
                .resolve_repo(&owner, &repo_name)
                .ok_or(ApiError::NotFound)?;
            let user = identity.as_ref().and_then(|i| i.user_for(&repo));
            state.forge.authorize_pull(user, &repo)?;
            dir
        }
        GitService::ReceivePack => {
            let identity = identity.ok_or(ApiError::Unauthorized)?;
            let (repo, dir) = state
                .forge
                .resolve_repo(&owner, &repo_name)
                .ok_or(ApiError::NotFound)?;
            state
                .forge
                .authorize_push(identity.user_for(&repo), &repo)?;
            dir
        }
    };

    let stream = state.forge.runner.advertise(service, &dir).await?;
    Ok(git_response(
        &format!("application/x-{}-advertisement", service.name()),
        Body::from_stream(stream),
    ))
}

/// `POST /<owner>/<repo>/git-upload-pack`
async fn upload_pack(
    State(state): State<AppState>,
    Path((owner, repo_name)): Path<(String, String)>,
    Query(query): Query<GitQuery>,
    request: Request,
) -> Result<Response, ApiError> {
    let identity = state
        .forge
        .http_identity(request.headers(), query.access_token.as_deref());
    let (repo, dir) = state
        .forge
        .resolve_repo(&owner, &repo_name)
        .ok_or(ApiError::NotFound)?;
    let actor = identity
        .as_ref()
        .and_then(|i| i.user_for(&repo))
        .cloned();
    state.forge.authorize_pull(actor.as_ref(), &repo)?;

    serve_service(state, GitService::UploadPack, repo, dir, actor, request).await
}

/// `POST /<owner>/<repo>/git-receive-pack`
async fn receive_pack(
    State(state): State<AppState>,
    Path((owner, repo_name)): Path<(String, String)>,
    Query(query): Query<GitQuery>,
    request: Request,
) -> Result<Response, ApiError> {
    let identity = state
        .forge
        .http_identity(request.headers(), query.access_token.as_deref())
        .ok_or(ApiError::Unauthorized)?;
    let (repo, dir) = state
        .forge
        .resolve_repo(&owner, &repo_name)
        .ok_or(ApiError::NotFound)?;
    let actor = identity.user_for(&repo).cloned();
    state.forge.authorize_push(actor.as_ref(), &repo)?;

    serve_service(state, GitService::ReceivePack, repo, dir, actor, request).await
}

/// Wire the request body through the runner and stream the child back,
/// recording the outcome once the child exits.
async fn serve_service(
    state: AppState,
    service: GitService,
    repo: Repository,
    dir: PathBuf,
    actor: Option<User>,
    request: Request,
) -> Result<Response, ApiError> {
    let protocol = request
        .headers()
        .get("git-protocol")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());
    let content_length = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    let ip = client_ip(request.headers(), Some(&request));

    let input: bellows_git::ByteStream = Box::pin(
        request
            .into_body()
            .into_data_stream()
            .map_err(std::io::Error::other),
    );
    let handle = state
        .forge
        .runner
        .serve(
            service,
            &dir,
            input,
            ServeOptions {
                stateless_rpc: true,
                protocol,
            },
        )
        .await?;

    let forge = state.forge.clone();
    let completion = handle.completion;
    tokio::spawn(async move {
        let outcome = completion.await.unwrap_or(ServeOutcome::Cancelled);
        let path = repo.full_name();
        let action = match (&outcome, service.is_write()) {
            (ServeOutcome::Completed, false) => Some(AuditAction::HttpUploadPack),
            (ServeOutcome::Completed, true) => Some(AuditAction::HttpReceivePack),
            (ServeOutcome::Cancelled, false) => Some(AuditAction::HttpUploadPackCancelled),
            (ServeOutcome::Cancelled, true) => Some(AuditAction::HttpReceivePackCancelled),
            (ServeOutcome::Failed { .. }, _) => None,
        };

        if matches!(outcome, ServeOutcome::Completed) && service.is_write() {
            forge.push_finished(&repo, actor.as_ref()).await;
        }
        if let ServeOutcome::Failed { status, stderr } = &outcome {
            tracing::warn!(
                status,
                stderr = %stderr.trim(),
                repo = %path,
                service = %service,
                "git service failed"
            );
        }

        if let Some(action) = action {
            let mut record = AuditRecord::new(action)
                .actor(actor.as_ref().map(|u| u.id))
                .metadata(serde_json::json!({
                    "path": format!("/{path}/{}", service.name()),
                    "content_length": content_length,
                }));
            if repo.id != 0 {
                record = record.repo(repo.id);
            }
            if let Some(ip) = ip {
                record = record.ip(ip);
            }
            forge.emit_audit(record).await;
        }
    });

    Ok(git_response(
        &format!("application/x-{}-result", service.name()),
        Body::from_stream(handle.output),
    ))
}

// ---------------------------------------------------------------------------
// Dumb protocol
// ---------------------------------------------------------------------------

async fn authorize_dumb(
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

async fn serve_repo_file(
    dir: &FsPath,
    relative: &str,
    content_type: &str,
) -> Result<Response, ApiError> {
    let path = dir.join(relative);
    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(ApiError::NotFound),
        Err(e) => return Err(ApiError::Internal(e.to_string())),
    };
    Ok(git_response(
        content_type,
        Body::from_stream(ReaderStream::new(file)),
    ))
}

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// A ref name that is safe to join under the repository directory.
fn safe_ref_segment(name: &str) -> Result<(), ApiError> {
    if name.is_empty()
        || name.contains("..")
        || name.contains('\\')
        || name.starts_with('/')
        || name.starts_with('-')
    {
        return Err(ApiError::BadRequest("invalid ref name".into()));
    }
    Ok(())
}

async fn head_file(
    State(state): State<AppState>,
    Path((owner, repo_name)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let dir = authorize_dumb(&state, &owner, &repo_name, &headers).await?;
    serve_repo_file(&dir, "HEAD", "text/plain").await
}

async fn info_packs(
    State(state): State<AppState>,
    Path((owner, repo_name)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let dir = authorize_dumb(&state, &owner, &repo_name, &headers).await?;
    serve_repo_file(&dir, "objects/info/packs", "text/plain").await
}

async fn loose_object(
    State(state): State<AppState>,
    Path((owner, repo_name, prefix, rest)): Path<(String, String, String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if prefix.len() != 2 || !is_hex(&prefix) || rest.len() != 38 || !is_hex(&rest) {
        return Err(ApiError::NotFound);
    }
    let dir = authorize_dumb(&state, &owner, &repo_name, &headers).await?;
    serve_repo_file(
        &dir,
        &format!("objects/{prefix}/{rest}"),
        "application/x-git-loose-object",
    )
    .await
}

async fn pack_file(
    State(state): State<AppState>,
    Path((owner, repo_name, file)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let content_type = if file.starts_with("pack-") && file.ends_with(".pack") {
        "application/x-git-packed-objects"
    } else if file.starts_with("pack-") && file.ends_with(".idx") {
        "application/x-git-packed-objects-toc"
    } else {
        return Err(ApiError::NotFound);
    };
    if file.contains('/') || file.contains("..") {
        return Err(ApiError::NotFound);
    }
    let dir = authorize_dumb(&state, &owner, &repo_name, &headers).await?;
    serve_repo_file(&dir, &format!("objects/pack/{file}"), content_type).await
}

async fn branch_ref(
    State(state): State<AppState>,
    Path((owner, repo_name, name)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    safe_ref_segment(&name)?;
    let dir = authorize_dumb(&state, &owner, &repo_name, &headers).await?;
    serve_repo_file(&dir, &format!("refs/heads/{name}"), "text/plain").await
}

async fn tag_ref(
    State(state): State<AppState>,
    Path((owner, repo_name, name)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    safe_ref_segment(&name)?;
    let dir = authorize_dumb(&state, &owner, &repo_name, &headers).await?;
    serve_repo_file(&dir, &format!("refs/tags/{name}"), "text/plain").await
}
