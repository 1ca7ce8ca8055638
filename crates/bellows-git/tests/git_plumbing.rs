//! Integration tests against the real git binary.
//!
//! The server is a framing proxy around `git`, so the test suite requires
//! it, exactly like production.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use tempfile::TempDir;

use bellows_git::{
    blame, blob, branches, commits, diff, resolve_ref_path, rev_parse_verify, tree, ByteStream,
    GitError, GitRunner, ProcessRunner, RepoDirs, ServeOptions, ServeOutcome,
};

fn git(dir: &Path, args: &[&str]) {
    let status = std::process::Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .status()
        .expect("git binary available");
    assert!(status.success(), "git {args:?} failed in {}", dir.display());
}

fn git_out(dir: &Path, args: &[&str]) -> String {
    let output = std::process::Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()
        .expect("git binary available");
    assert!(output.status.success(), "git {args:?} failed");
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// A work repository on branch `trunk` with two commits and a
/// `feature/x` branch.
fn fixture() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let work = tmp.path().join("work");
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

    (tmp, work)
}

async fn read_all(mut stream: ByteStream) -> Vec<u8> {
    let mut out = Vec::new();
    while let Some(chunk) = stream.next().await {
        out.extend_from_slice(&chunk.unwrap());
    }
    out
}

#[tokio::test]
async fn advertisement_carries_prelude_then_refs() {
    let (tmp, work) = fixture();
    let bare = tmp.path().join("bare.git");
    git(
        tmp.path(),
        &["clone", "--bare", "--quiet", work.to_str().unwrap(), "bare.git"],
    );

    let runner = ProcessRunner::new();
    let body = read_all(
        runner
            .advertise(bellows_git::GitService::UploadPack, &bare)
            .await
            .unwrap(),
    )
    .await;

    let text = String::from_utf8_lossy(&body);
    assert!(
        text.starts_with("001e# service=git-upload-pack\n0000"),
        "unexpected prelude: {}",
        &text[..40.min(text.len())]
    );
    assert!(text.contains("refs/heads/trunk"));
    assert!(text.contains("refs/heads/feature/x"));
}

#[tokio::test]
async fn advertisement_works_on_a_fresh_bare_repo() {
    let tmp = TempDir::new().unwrap();
    let dirs = RepoDirs::new(tmp.path());
    let dir = dirs.ensure("alice", "empty").await.unwrap();

    let runner = ProcessRunner::new();
    let body = read_all(
        runner
            .advertise(bellows_git::GitService::UploadPack, &dir)
            .await
            .unwrap(),
    )
    .await;
    assert!(body.starts_with(b"001e# service=git-upload-pack\n0000"));
}

#[tokio::test]
async fn serve_completes_on_flush_only_request() {
    let (tmp, work) = fixture();
    let bare = tmp.path().join("serve.git");
    git(
        tmp.path(),
        &["clone", "--bare", "--quiet", work.to_str().unwrap(), "serve.git"],
    );

    let runner = ProcessRunner::new();
    let input: ByteStream = Box::pin(futures::stream::once(async {
        Ok(bytes::Bytes::from_static(b"0000"))
    }));
    let handle = runner
        .serve(
            bellows_git::GitService::UploadPack,
            &bare,
            input,
            ServeOptions {
                stateless_rpc: true,
                protocol: None,
            },
        )
        .await
        .unwrap();

    let _ = read_all(handle.output).await;
    assert!(matches!(
        handle.completion.await.unwrap(),
        ServeOutcome::Completed
    ));
}

#[tokio::test]
async fn tree_lists_root_and_subdirectories() {
    let (_tmp, work) = fixture();

    let root = tree(&work, "trunk", "").await.unwrap();
    let names: Vec<&str> = root.iter().map(|e| e.name.as_str()).collect();
    assert!(names.contains(&"README.md"));
    assert!(names.contains(&"src"));

    let src = tree(&work, "trunk", "src").await.unwrap();
    assert_eq!(src.len(), 1);
    assert_eq!(src[0].name, "lib.rs");
    assert_eq!(src[0].kind, "blob");
}

#[tokio::test]
async fn blob_returns_raw_content() {
    let (_tmp, work) = fixture();
    let content = blob(&work, "trunk", "README.md").await.unwrap();
    assert_eq!(content, b"line one\nline two\n");
}

#[tokio::test]
async fn missing_paths_and_refs_are_not_found() {
    let (_tmp, work) = fixture();
    assert!(matches!(
        blob(&work, "trunk", "missing.txt").await,
        Err(GitError::NotFound(_))
    ));
    assert!(matches!(
        tree(&work, "no-such-branch", "").await,
        Err(GitError::NotFound(_))
    ));
}

#[tokio::test]
async fn commits_report_subject_and_author() {
    let (_tmp, work) = fixture();
    let log = commits(&work, "trunk", "").await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].author, "Test");
    assert_eq!(log[0].message, "initial import");

    let scoped = commits(&work, "feature/x", "NOTES.md").await.unwrap();
    assert_eq!(scoped.len(), 1);
    assert_eq!(scoped[0].message, "feature: notes");
}

#[tokio::test]
async fn branches_include_tips() {
    let (_tmp, work) = fixture();
    let all = branches(&work).await.unwrap();
    let names: Vec<&str> = all.iter().map(|b| b.name.as_str()).collect();
    assert!(names.contains(&"trunk"));
    assert!(names.contains(&"feature/x"));
    for branch in &all {
        assert_eq!(branch.commit.len(), 40);
    }
}

#[tokio::test]
async fn diff_shows_the_commit_patch() {
    let (_tmp, work) = fixture();
    let sha = git_out(&work, &["rev-parse", "trunk"]);
    let patch = diff(&work, &sha).await.unwrap();
    assert!(patch.contains("initial import"));
    assert!(patch.contains("README.md"));
}

#[tokio::test]
async fn blame_attributes_every_line() {
    let (_tmp, work) = fixture();
    let lines = blame(&work, "trunk", "README.md").await.unwrap();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].line_no, 1);
    assert_eq!(lines[1].line_no, 2);
    assert_eq!(lines[0].author, "Test");
    assert_eq!(lines[0].content, "line one");
}

#[tokio::test]
async fn ref_path_resolution_is_greedy() {
    let (_tmp, work) = fixture();

    assert!(rev_parse_verify(&work, "trunk").await);
    assert!(!rev_parse_verify(&work, "nope").await);

    let segments: Vec<String> = ["feature", "x", "NOTES.md"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let (reference, path) = resolve_ref_path(&work, &segments).await.unwrap();
    assert_eq!(reference, "feature/x");
    assert_eq!(path, "NOTES.md");

    let segments: Vec<String> = ["trunk", "src", "lib.rs"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let (reference, path) = resolve_ref_path(&work, &segments).await.unwrap();
    assert_eq!(reference, "trunk");
    assert_eq!(path, "src/lib.rs");

    let segments: Vec<String> = vec!["garbage".to_string()];
    assert!(resolve_ref_path(&work, &segments).await.is_none());
}
