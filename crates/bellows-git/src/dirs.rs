//! On-disk bare repository layout.

use std::path::{Path, PathBuf};

use bellows_types::{validate_repo_name, validate_username};

use crate::{GitError, Result};

/// Deterministic bare-repository layout: `<base>/<owner>/<repo>.git`.
///
/// No reference counting and no locks of our own: concurrent Git
/// operations on the same directory are isolated by Git's ref locking.
#[derive(Debug, Clone)]
pub struct RepoDirs {
    base: PathBuf,
}

impl RepoDirs {
    /// Create a layout rooted at `base`.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// The base directory.
    pub fn base(&self) -> &Path {
        &self.base
    }

    fn validated_path(&self, owner: &str, repo: &str) -> Result<PathBuf> {
        validate_username(owner)
            .map_err(|e| GitError::InvalidPath(format!("{owner}: {e}")))?;
        validate_repo_name(repo)
            .map_err(|e| GitError::InvalidPath(format!("{repo}: {e}")))?;
        Ok(self.base.join(owner).join(format!("{repo}.git")))
    }

    /// Directory path for a repository, without touching the filesystem.
    pub fn locate(&self, owner: &str, repo: &str) -> Result<PathBuf> {
        self.validated_path(owner, repo)
    }

    /// Directory path if an initialized bare repository exists there.
    pub fn find(&self, owner: &str, repo: &str) -> Option<PathBuf> {
        let dir = self.validated_path(owner, repo).ok()?;
        dir.join("HEAD").is_file().then_some(dir)
    }

    /// Ensure the bare repository exists, initializing it when `HEAD` is
    /// absent.
    pub async fn ensure(&self, owner: &str, repo: &str) -> Result<PathBuf> {
        let dir = self.validated_path(owner, repo)?;
        if dir.join("HEAD").is_file() {
            return Ok(dir);
        }
        tokio::fs::create_dir_all(&dir).await?;

        let output = tokio::process::Command::new("git")
            .arg("init")
            .arg("--bare")
            .arg("--quiet")
            .arg(&dir)
            .output()
            .await
            .map_err(GitError::Spawn)?;
        if !output.status.success() {
            return Err(GitError::Upstream {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        tracing::info!(dir = %dir.display(), "initialized bare repository");
        Ok(dir)
    }

    /// Recursively delete the repository directory.
    ///
    /// Callers must hold no open Git children for this path.
    pub async fn remove(&self, owner: &str, repo: &str) -> Result<()> {
        let dir = self.validated_path(owner, repo)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(GitError::Io(e)),
        }
    }

    /// Walk the base directory for `<owner>/<repo>.git` entries that hold a
    /// `HEAD`. Used by the storeless degraded mode.
    pub fn scan(&self) -> Vec<(String, String)> {
        let mut found = Vec::new();
        let Ok(owners) = std::fs::read_dir(&self.base) else {
            return found;
        };
        for owner in owners.flatten() {
            let Ok(owner_name) = owner.file_name().into_string() else {
                continue;
            };
            let Ok(repos) = std::fs::read_dir(owner.path()) else {
                continue;
            };
            for repo in repos.flatten() {
                let Ok(dir_name) = repo.file_name().into_string() else {
                    continue;
                };
                let Some(repo_name) = dir_name.strip_suffix(".git") else {
                    continue;
                };
                if repo.path().join("HEAD").is_file() {
                    found.push((owner_name.clone(), repo_name.to_string()));
                }
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locate_is_deterministic_and_pure() {
        let dirs = RepoDirs::new("/srv/repos");
        let path = dirs.locate("alice", "widget").unwrap();
        assert_eq!(path, PathBuf::from("/srv/repos/alice/widget.git"));
        assert!(!path.exists());
    }

    #[test]
    fn traversal_segments_are_rejected() {
        let dirs = RepoDirs::new("/srv/repos");
        assert!(matches!(
            dirs.locate("..", "widget"),
            Err(GitError::InvalidPath(_))
        ));
        assert!(matches!(
            dirs.locate("alice", "../etc"),
            Err(GitError::InvalidPath(_))
        ));
        assert!(matches!(
            dirs.locate("alice", ".git"),
            Err(GitError::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn ensure_initializes_once_and_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = RepoDirs::new(tmp.path());

        let dir = dirs.ensure("alice", "widget").await.unwrap();
        assert!(dir.join("HEAD").is_file());
        assert!(dirs.find("alice", "widget").is_some());

        // Second call must not reinitialize.
        let again = dirs.ensure("alice", "widget").await.unwrap();
        assert_eq!(dir, again);
    }

    #[tokio::test]
    async fn remove_deletes_and_tolerates_absence() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = RepoDirs::new(tmp.path());
        dirs.ensure("alice", "widget").await.unwrap();

        dirs.remove("alice", "widget").await.unwrap();
        assert!(dirs.find("alice", "widget").is_none());
        dirs.remove("alice", "widget").await.unwrap();
    }

    #[tokio::test]
    async fn scan_reports_initialized_repositories() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = RepoDirs::new(tmp.path());
        dirs.ensure("alice", "widget").await.unwrap();
        dirs.ensure("bob", "tools").await.unwrap();
        // A bare directory without HEAD is not a repository.
        std::fs::create_dir_all(tmp.path().join("carol/empty.git")).unwrap();

        let mut found = dirs.scan();
        found.sort();
        assert_eq!(
            found,
            vec![
                ("alice".to_string(), "widget".to_string()),
                ("bob".to_string(), "tools".to_string()),
            ]
        );
    }
}
