//! Read-only repository views computed from `git` porcelain output.
//!
//! Every function shells out to `git -C <repo_dir>` and parses the output;
//! nothing here opens object files. Child stderr mentioning an unknown
//! ref/path classifies as [`GitError::NotFound`], anything else as
//! [`GitError::Upstream`].

use std::path::Path;

use serde::Serialize;
use tokio::process::Command;

use crate::{GitError, Result};

/// Markers in git stderr that mean "the thing you asked for is not there".
const NOT_FOUND_MARKERS: [&str; 4] = [
    "does not exist",
    "unknown revision",
    "bad revision",
    "not a valid object",
];

/// One `ls-tree` entry.
#[derive(Debug, Clone, Serialize)]
pub struct TreeEntry {
    /// File mode, e.g. `100644`.
    pub mode: String,
    /// Object type: `blob`, `tree`, or `commit` for submodules.
    #[serde(rename = "type")]
    pub kind: String,
    /// Object hash.
    pub hash: String,
    /// Entry name relative to the listed directory.
    pub name: String,
}

/// One `git log` line.
#[derive(Debug, Clone, Serialize)]
pub struct CommitInfo {
    /// Commit hash.
    pub hash: String,
    /// Author name.
    pub author: String,
    /// Author date, ISO 8601.
    pub date: String,
    /// Subject line.
    pub message: String,
}

/// One branch.
#[derive(Debug, Clone, Serialize)]
pub struct BranchInfo {
    /// Short branch name.
    pub name: String,
    /// Commit the branch points at.
    pub commit: String,
}

/// One blamed line.
#[derive(Debug, Clone, Serialize)]
pub struct BlameLine {
    /// Line number in the blamed revision.
    pub line_no: u32,
    /// Commit that introduced the line.
    pub commit: String,
    /// Author name.
    pub author: String,
    /// Author time as unix seconds.
    pub date: String,
    /// Line content.
    pub content: String,
}

async fn run_git(repo_dir: &Path, args: &[&str]) -> Result<Vec<u8>> {
    let output = Command::new("git")
        .arg("-C")
        .arg(repo_dir)
        .args(args)
        .output()
        .await
        .map_err(GitError::Spawn)?;

    if output.status.success() {
        return Ok(output.stdout);
    }
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    let lowered = stderr.to_lowercase();
    if NOT_FOUND_MARKERS.iter().any(|m| lowered.contains(m)) {
        Err(GitError::NotFound(stderr.trim().to_string()))
    } else {
        Err(GitError::Upstream {
            status: output.status.code().unwrap_or(-1),
            stderr,
        })
    }
}

/// Whether `git rev-parse --verify` accepts the revision.
pub async fn rev_parse_verify(repo_dir: &Path, revision: &str) -> bool {
    if revision.is_empty() || revision.starts_with('-') {
        return false;
    }
    run_git(repo_dir, &["rev-parse", "--verify", "--quiet", revision])
        .await
        .is_ok()
}

/// Split URL segments into `(ref, path)`.
///
/// A segment sequence like `feature/x/README` is ambiguous; the longest
/// prefix that `rev-parse --verify` accepts wins and the remainder is the
/// path.
pub async fn resolve_ref_path(
    repo_dir: &Path,
    segments: &[String],
) -> Option<(String, String)> {
    for take in (1..=segments.len()).rev() {
        let candidate = segments[..take].join("/");
        if rev_parse_verify(repo_dir, &candidate).await {
            return Some((candidate, segments[take..].join("/")));
        }
    }
    None
}

/// List a directory at a revision. A path naming a file yields its single
/// entry.
pub async fn tree(repo_dir: &Path, revision: &str, path: &str) -> Result<Vec<TreeEntry>> {
    if path.is_empty() {
        let output = run_git(repo_dir, &["ls-tree", revision]).await?;
        return Ok(parse_tree(&String::from_utf8_lossy(&output)));
    }

    // Trailing slash lists a directory's children rather than the entry
    // itself; a file path only answers without the slash.
    let spec = format!("{path}/");
    let output = run_git(repo_dir, &["ls-tree", revision, "--", &spec]).await?;
    let mut listing = String::from_utf8_lossy(&output).into_owned();
    if listing.is_empty() {
        let output = run_git(repo_dir, &["ls-tree", revision, "--", path]).await?;
        listing = String::from_utf8_lossy(&output).into_owned();
    }
    let mut entries = parse_tree(&listing);
    if entries.is_empty() {
        // ls-tree reports an unknown path as empty output, not an error.
        return Err(GitError::NotFound(format!("{revision}:{path}")));
    }
    // ls-tree prints full paths when a directory is listed; keep names
    // relative to the listed directory.
    if !path.is_empty() {
        let prefix = format!("{path}/");
        for entry in &mut entries {
            if let Some(stripped) = entry.name.strip_prefix(&prefix) {
                entry.name = stripped.to_string();
            }
        }
    }
    Ok(entries)
}

fn parse_tree(listing: &str) -> Vec<TreeEntry> {
    listing
        .lines()
        .filter_map(|line| {
            let (meta, name) = line.split_once('\t')?;
            let mut fields = meta.split_whitespace();
            Some(TreeEntry {
                mode: fields.next()?.to_string(),
                kind: fields.next()?.to_string(),
                hash: fields.next()?.to_string(),
                name: name.to_string(),
            })
        })
        .collect()
}

/// Raw blob content at `revision:path`.
pub async fn blob(repo_dir: &Path, revision: &str, path: &str) -> Result<Vec<u8>> {
    let spec = format!("{revision}:{path}");
    run_git(repo_dir, &["show", &spec]).await
}

/// Last 20 commits touching `path` (or the whole tree when empty).
pub async fn commits(repo_dir: &Path, revision: &str, path: &str) -> Result<Vec<CommitInfo>> {
    let format = "--pretty=format:%H|%an|%aI|%s";
    let output = if path.is_empty() {
        run_git(repo_dir, &["log", format, "-n", "20", revision]).await?
    } else {
        run_git(repo_dir, &["log", format, "-n", "20", revision, "--", path]).await?
    };
    Ok(parse_commits(&String::from_utf8_lossy(&output)))
}

fn parse_commits(log: &str) -> Vec<CommitInfo> {
    log.lines()
        .filter_map(|line| {
            let mut fields = line.splitn(4, '|');
            Some(CommitInfo {
                hash: fields.next()?.to_string(),
                author: fields.next()?.to_string(),
                date: fields.next()?.to_string(),
                message: fields.next().unwrap_or_default().to_string(),
            })
        })
        .collect()
}

/// All branches with their tip commits.
pub async fn branches(repo_dir: &Path) -> Result<Vec<BranchInfo>> {
    let output = run_git(
        repo_dir,
        &["branch", "--format=%(refname:short)%09%(objectname)"],
    )
    .await?;
    Ok(parse_branches(&String::from_utf8_lossy(&output)))
}

fn parse_branches(listing: &str) -> Vec<BranchInfo> {
    listing
        .lines()
        .filter_map(|line| {
            let (name, commit) = line.split_once('\t')?;
            Some(BranchInfo {
                name: name.to_string(),
                commit: commit.trim().to_string(),
            })
        })
        .collect()
}

/// `git show <sha>`: the commit with its patch.
pub async fn diff(repo_dir: &Path, sha: &str) -> Result<String> {
    if sha.is_empty() || sha.starts_with('-') {
        return Err(GitError::NotFound(sha.to_string()));
    }
    let output = run_git(repo_dir, &["show", sha]).await?;
    Ok(String::from_utf8_lossy(&output).into_owned())
}

/// Per-line blame for a file at a revision.
pub async fn blame(repo_dir: &Path, revision: &str, path: &str) -> Result<Vec<BlameLine>> {
    let output = run_git(
        repo_dir,
        &["blame", "--line-porcelain", revision, "--", path],
    )
    .await?;
    Ok(parse_blame(&String::from_utf8_lossy(&output)))
}

fn parse_blame(porcelain: &str) -> Vec<BlameLine> {
    let mut lines = Vec::new();
    let mut commit = String::new();
    let mut line_no = 0u32;
    let mut author = String::new();
    let mut date = String::new();

    for line in porcelain.lines() {
        if let Some(content) = line.strip_prefix('\t') {
            lines.push(BlameLine {
                line_no,
                commit: commit.clone(),
                author: author.clone(),
                date: date.clone(),
                content: content.to_string(),
            });
        } else if let Some(value) = line.strip_prefix("author ") {
            author = value.to_string();
        } else if let Some(value) = line.strip_prefix("author-time ") {
            date = value.to_string();
        } else {
            // `<sha> <orig-line> <final-line> [<group-size>]`
            let mut fields = line.split_whitespace();
            if let (Some(sha), Some(_), Some(final_line)) =
                (fields.next(), fields.next(), fields.next())
            {
                if sha.len() == 40 && sha.bytes().all(|b| b.is_ascii_hexdigit()) {
                    commit = sha.to_string();
                    line_no = final_line.parse().unwrap_or(0);
                }
            }
        }
    }
    lines
}

/// Branch `HEAD` points at, if it is a symbolic ref.
pub async fn head_branch(repo_dir: &Path) -> Option<String> {
    let output = run_git(repo_dir, &["symbolic-ref", "--short", "HEAD"])
        .await
        .ok()?;
    let name = String::from_utf8_lossy(&output).trim().to_string();
    (!name.is_empty()).then_some(name)
}
