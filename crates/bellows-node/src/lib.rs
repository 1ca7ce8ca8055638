//! # Bellows Node
//!
//! The forge server: Git Smart-HTTP and SSH transports proxying the
//! canonical `git` binary, the Git-LFS batch API over pluggable blob
//! storage, a JSON read API, and the repository lifecycle boundary.
//!
//! ## Endpoint overview
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/health` | Liveness probe |
//! | GET | `/api/repos` | List repositories visible to the caller |
//! | POST | `/api/repos` | Create a repository |
//! | GET/DELETE | `/api/repos/{owner}/{repo}` | Repository metadata / deletion |
//! | GET | `/api/repos/{owner}/{repo}/tree/{ref}/{path}` | Directory listing |
//! | GET | `/api/repos/{owner}/{repo}/blob/{ref}/{path}` | File content |
//! | GET | `/api/repos/{owner}/{repo}/commits/{ref}/{path}` | History |
//! | GET | `/api/repos/{owner}/{repo}/branches` | Branches |
//! | GET | `/api/repos/{owner}/{repo}/diff/{sha}` | Commit patch |
//! | GET | `/api/repos/{owner}/{repo}/blame/{ref}/{path}` | Per-line blame |
//! | GET | `/{owner}/{repo}/info/refs` | Smart-HTTP advertisement |
//! | POST | `/{owner}/{repo}/git-upload-pack` | Fetch / clone |
//! | POST | `/{owner}/{repo}/git-receive-pack` | Push |
//! | POST | `/{owner}/{repo}/objects/batch` | LFS batch negotiation |
//! | GET/PUT | `/{owner}/{repo}/objects/{oid}` | LFS object transfer |
//!
//! Plus the dumb-protocol file fallback (`HEAD`, loose objects, packs,
//! refs) for ancient clients.

pub mod config;
mod error;
mod forge;
mod git_http;
mod lfs_api;
mod read_api;
mod repo_api;

pub use error::ApiError;
pub use forge::{Forge, PushEvent};
pub use repo_api::RepoView;

use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The forge core.
    pub forge: Arc<Forge>,
}

/// Build the HTTP router.
pub fn create_router(state: AppState) -> Router {
    repo_api::routes()
        .merge(read_api::routes())
        .merge(lfs_api::routes())
        .merge(git_http::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
