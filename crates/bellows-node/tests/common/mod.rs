//! Shared fixtures for the node integration tests.
#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, Response};
use tokio::sync::broadcast;
use tower::ServiceExt;

use bellows_audit::MemoryAuditSink;
use bellows_auth::{generate_token, RecordResolver, RoleAccess};
use bellows_blob::MemoryBlobStore;
use bellows_git::{ProcessRunner, RepoDirs};
use bellows_node::{create_router, AppState, Forge, PushEvent};
use bellows_records::RecordStore;
use bellows_types::{AuditAction, Repository, User, Visibility};

pub struct TestForge {
    pub app: axum::Router,
    pub state: AppState,
    pub records: RecordStore,
    pub audit: Arc<MemoryAuditSink>,
    pub blobs: Arc<MemoryBlobStore>,
    pub push_events: broadcast::Sender<PushEvent>,
    #[allow(dead_code)]
    tmp: tempfile::TempDir,
}

impl TestForge {
    pub fn repo_base(&self) -> std::path::PathBuf {
        self.tmp.path().join("repos")
    }

    pub async fn request(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }
}

pub fn build_forge(storeless: bool) -> TestForge {
    let tmp = tempfile::tempdir().unwrap();
    let records = RecordStore::in_memory();
    let audit = Arc::new(MemoryAuditSink::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let (push_events, _) = broadcast::channel(16);

    let forge = Arc::new(Forge {
        records: records.clone(),
        storeless,
        dirs: RepoDirs::new(tmp.path().join("repos")),
        runner: Arc::new(ProcessRunner::new()),
        resolver: Arc::new(RecordResolver::new(records.clone())),
        access: Arc::new(RoleAccess::new(records.clone())),
        blobs: blobs.clone(),
        audit: audit.clone(),
        push_events: push_events.clone(),
    });
    let state = AppState {
        forge: forge.clone(),
    };

    TestForge {
        app: create_router(state.clone()),
        state,
        records,
        audit,
        blobs,
        push_events,
        tmp,
    }
}

/// Create a user with one personal access token; returns the raw token.
pub fn seed_user(forge: &TestForge, username: &str) -> (User, String) {
    let user = forge
        .records
        .users
        .create(username, &format!("{username}@example.com"))
        .unwrap();
    let (raw, hash) = generate_token();
    forge
        .records
        .tokens
        .issue(user.id, "test", &hash, Vec::new(), None)
        .unwrap();
    (user, raw)
}

/// Create a repository record and its bare directory.
pub async fn seed_repo(
    forge: &TestForge,
    owner: &User,
    name: &str,
    visibility: Visibility,
) -> Repository {
    let repo = forge
        .records
        .repos
        .create(owner, name, visibility)
        .unwrap();
    forge
        .state
        .forge
        .dirs
        .ensure(&repo.owner, &repo.name)
        .await
        .unwrap();
    repo
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn get_auth(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

pub fn post(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(body.into())
        .unwrap()
}

pub fn post_auth(uri: &str, token: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(body.into())
        .unwrap()
}

pub fn post_json(uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Wait for an audit record with the given action to appear; the
/// transports append them after the child exits, off the response path.
pub async fn wait_for_audit(
    audit: &MemoryAuditSink,
    action: AuditAction,
) -> bellows_types::AuditRecord {
    for _ in 0..100 {
        if let Some(record) = audit.records_for(action).into_iter().next() {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("no audit record with action {action} appeared");
}

/// Run `git` in a directory, asserting success.
pub fn git(dir: &Path, args: &[&str]) {
    let status = std::process::Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .status()
        .expect("git binary available");
    assert!(status.success(), "git {args:?} failed in {}", dir.display());
}

/// Build a work repository with content and mirror it into `bare`.
pub fn populate_bare(tmp: &Path, bare: &Path) {
    let work = tmp.join("work-fixture");
    std::fs::create_dir_all(&work).unwrap();
    git(&work, &["init", "--quiet"]);
    git(&work, &["config", "user.email", "test@example.com"]);
    git(&work, &["config", "user.name", "Test"]);
    git(&work, &["checkout", "-q", "-b", "trunk"]);
    std::fs::write(work.join("README.md"), "line one\nline two\n").unwrap();
    std::fs::create_dir_all(work.join("src")).unwrap();
    std::fs::write(work.join("src/lib.rs"), "pub fn answer() -> u32 { 42 }\n").unwrap();
    git(&work, &["add", "."]);
    git(&work, &["commit", "-q", "-m", "initial import"]);
    git(&work, &["checkout", "-q", "-b", "feature/x"]);
    std::fs::write(work.join("NOTES.md"), "feature notes\n").unwrap();
    git(&work, &["add", "NOTES.md"]);
    git(&work, &["commit", "-q", "-m", "feature: notes"]);
    git(&work, &["checkout", "-q", "trunk"]);

    git(
        &work,
        &[
            "push",
            "--quiet",
            bare.to_str().unwrap(),
            "trunk",
            "feature/x",
        ],
    );
    std::fs::remove_dir_all(&work).unwrap();
}
