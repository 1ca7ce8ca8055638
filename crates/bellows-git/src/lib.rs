//! Bare repository storage and the Git service runner.
//!
//! This crate deliberately parses no Git object formats. The canonical
//! `git` binary does all repository work as a child process; everything
//! here is the framing around it: where bare directories live, how
//! `upload-pack`/`receive-pack` children are spawned and wired to client
//! streams, and how porcelain output is turned into read-API records.

mod dirs;
mod error;
mod inspect;
mod pktline;
mod runner;
mod service;

pub use dirs::RepoDirs;
pub use error::GitError;
pub use inspect::{
    blame, blob, branches, commits, diff, head_branch, resolve_ref_path, rev_parse_verify, tree,
    BlameLine, BranchInfo, CommitInfo, TreeEntry,
};
pub use pktline::{advertisement_prelude, encode_pkt, FLUSH_PKT};
pub use runner::{EchoRunner, GitRunner, ProcessRunner, ServeHandle, ServeOptions, ServeOutcome};
pub use service::GitService;

use bytes::Bytes;

/// Result type for git plumbing operations.
pub type Result<T> = std::result::Result<T, GitError>;

/// A stream of wire bytes flowing to or from a Git child process.
pub type ByteStream = futures::stream::BoxStream<'static, std::io::Result<Bytes>>;
