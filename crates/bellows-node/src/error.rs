//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// API error kinds, mapped onto HTTP status codes.
///
/// `Upstream` carries the child's stderr for the server log; the response
/// body never includes it.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Repository, ref, or object does not exist, or is hidden from this
    /// caller.
    #[error("not found")]
    NotFound,

    /// A protected operation with no valid identity.
    #[error("authentication required")]
    Unauthorized,

    /// Identity present, predicate denied, existence already known.
    #[error("forbidden")]
    Forbidden,

    /// Malformed path, unknown service, or invalid payload.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Resource already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The git child failed.
    #[error("git operation failed")]
    Upstream(String),

    /// Storage or process failure.
    #[error("internal error")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Upstream(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        match &self {
            ApiError::Upstream(detail) | ApiError::Internal(detail) => {
                tracing::error!(status = %status.as_u16(), detail = %detail, "request failed");
            }
            _ => {
                tracing::debug!(status = %status.as_u16(), error = %self, "request rejected");
            }
        }

        let body = Json(ErrorResponse {
            error: self.to_string(),
        });
        let mut response = (status, body).into_response();
        if status == StatusCode::UNAUTHORIZED {
            // Git and LFS clients retry with credentials on a Basic
            // challenge.
            response.headers_mut().insert(
                axum::http::header::WWW_AUTHENTICATE,
                axum::http::HeaderValue::from_static("Basic realm=\"bellows\""),
            );
        }
        response
    }
}

impl From<bellows_git::GitError> for ApiError {
    fn from(err: bellows_git::GitError) -> Self {
        use bellows_git::GitError;
        match err {
            GitError::UnknownService(s) => ApiError::BadRequest(format!("unknown service: {s}")),
            GitError::InvalidPath(p) => ApiError::BadRequest(p),
            GitError::NotFound(_) => ApiError::NotFound,
            GitError::Spawn(e) => ApiError::Internal(format!("spawning git failed: {e}")),
            GitError::Upstream { status, stderr } => {
                ApiError::Upstream(format!("git exited {status}: {stderr}"))
            }
            GitError::Io(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<bellows_records::RecordError> for ApiError {
    fn from(err: bellows_records::RecordError) -> Self {
        use bellows_records::RecordError;
        match err {
            RecordError::RepoExists(name) => ApiError::Conflict(name),
            RecordError::UsernameExists(name) => ApiError::Conflict(name),
            RecordError::InvalidName(e) => ApiError::BadRequest(e.to_string()),
            RecordError::RepoNotFound(_) | RecordError::UserNotFound(_) => ApiError::NotFound,
            RecordError::TokenNotFound => ApiError::Internal("token row vanished".to_string()),
            RecordError::Persistence(e) => ApiError::Internal(e),
        }
    }
}

impl From<bellows_blob::BlobError> for ApiError {
    fn from(err: bellows_blob::BlobError) -> Self {
        use bellows_blob::BlobError;
        match err {
            BlobError::NotFound(_) => ApiError::NotFound,
            other => ApiError::Internal(other.to_string()),
        }
    }
}
