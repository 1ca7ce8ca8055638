//! Name validation shared by the record store and the transports.
//!
//! Both names become filesystem path segments under the repository base
//! directory, so the rules exist to keep `<base>/<owner>/<repo>.git`
//! traversal-safe as much as to keep URLs readable.

use thiserror::Error;

/// Why a name was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    /// Empty or too long.
    #[error("name must be 1-100 characters")]
    Length,
    /// Reserved path component.
    #[error("name is reserved")]
    Reserved,
    /// Bad leading character.
    #[error("name cannot start with '.' or '-'")]
    BadStart,
    /// Parent-directory sequence.
    #[error("name cannot contain '..'")]
    DotDot,
    /// Character outside the allowed set.
    #[error("name may only contain letters, digits, '-', '_' and '.'")]
    BadCharacter,
}

/// Validate a repository name.
pub fn validate_repo_name(name: &str) -> Result<(), NameError> {
    if name.is_empty() || name.len() > 100 {
        return Err(NameError::Length);
    }
    if name == "." || name == ".." {
        return Err(NameError::Reserved);
    }
    if name.starts_with('.') || name.starts_with('-') {
        return Err(NameError::BadStart);
    }
    if name.contains("..") {
        return Err(NameError::DotDot);
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(NameError::BadCharacter);
    }
    Ok(())
}

/// Validate a username.
///
/// Usernames are a strict subset of repository names: lowercase
/// alphanumerics and single hyphens, starting and ending alphanumeric.
pub fn validate_username(username: &str) -> Result<(), NameError> {
    if username.is_empty() || username.len() > 39 {
        return Err(NameError::Length);
    }
    let chars: Vec<char> = username.chars().collect();
    if !chars[0].is_ascii_alphanumeric() || !chars[chars.len() - 1].is_ascii_alphanumeric() {
        return Err(NameError::BadStart);
    }
    for (i, c) in chars.iter().enumerate() {
        if !c.is_ascii_lowercase() && !c.is_ascii_digit() && *c != '-' {
            return Err(NameError::BadCharacter);
        }
        if *c == '-' && i > 0 && chars[i - 1] == '-' {
            return Err(NameError::BadCharacter);
        }
    }
    Ok(())
}
