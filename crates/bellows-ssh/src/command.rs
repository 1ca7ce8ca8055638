//! Parsing of `exec` request payloads.

use bellows_git::GitService;

/// A parsed Git exec command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCommand {
    /// Which transport service to run.
    pub service: GitService,
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repo: String,
}

/// Parse an exec payload like `git-upload-pack '/owner/repo.git'`.
///
/// The path may be single- or double-quoted; a leading `/` and a trailing
/// `.git` are stripped; exactly two non-empty components must remain.
pub fn parse_git_command(payload: &str) -> Result<GitCommand, String> {
    let payload = payload.trim();
    let (name, rest) = payload
        .split_once(' ')
        .ok_or_else(|| "missing repository path".to_string())?;

    let service = GitService::from_name(name)
        .map_err(|_| format!("unsupported command: {name}"))?;

    let mut path = rest.trim();
    for quote in ['\'', '"'] {
        if let Some(inner) = path
            .strip_prefix(quote)
            .and_then(|p| p.strip_suffix(quote))
        {
            path = inner;
            break;
        }
    }
    let path = path.trim_start_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);

    let mut components = path.split('/');
    let owner = components.next().unwrap_or_default();
    let repo = components.next().unwrap_or_default();
    if owner.is_empty() || repo.is_empty() || components.next().is_some() {
        return Err(format!("invalid repository path: {rest}"));
    }

    Ok(GitCommand {
        service,
        owner: owner.to_string(),
        repo: repo.to_string(),
    })
}
