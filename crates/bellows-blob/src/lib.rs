//! Opaque key→stream blob storage, used by the LFS transport.
//!
//! Keys are `owner/repo/oid` triples; content is addressed by the client's
//! OID, so partial writes are tolerable; the client retries by OID. Two
//! production backends exist: a filesystem tree and an S3-compatible bucket
//! signed with AWS Signature Version 4. [`MemoryBlobStore`] is the test
//! fake.

mod fs;
mod memory;
mod s3;
mod sigv4;

pub use fs::FsBlobStore;
pub use memory::MemoryBlobStore;
pub use s3::{S3BlobStore, S3Config};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// A stream of blob content.
pub type ByteStream = futures::stream::BoxStream<'static, std::io::Result<Bytes>>;

/// Wrap a single buffer as a [`ByteStream`].
pub fn stream_of(data: Bytes) -> ByteStream {
    Box::pin(futures::stream::once(async move { Ok(data) }))
}

/// Collect a [`ByteStream`] into one buffer.
pub async fn collect(mut stream: ByteStream) -> std::io::Result<Bytes> {
    use futures::StreamExt;
    let mut out = Vec::new();
    while let Some(chunk) = stream.next().await {
        out.extend_from_slice(&chunk?);
    }
    Ok(Bytes::from(out))
}

/// Storage key for one blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobKey {
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Content OID (lowercase hex SHA-256 for LFS).
    pub oid: String,
}

impl BlobKey {
    /// Build a key.
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        oid: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            oid: oid.into(),
        }
    }

    /// Relative `owner/repo/oid` form used by both backends.
    pub fn relative(&self) -> String {
        format!("{}/{}/{}", self.owner, self.repo, self.oid)
    }
}

impl std::fmt::Display for BlobKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.relative())
    }
}

/// Errors raised by blob stores.
#[derive(Debug, Error)]
pub enum BlobError {
    /// No blob under that key.
    #[error("blob not found: {0}")]
    NotFound(String),

    /// Local I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Remote transport failure.
    #[error("network error: {0}")]
    Network(String),

    /// The backend answered with an error.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result type for blob operations.
pub type Result<T> = std::result::Result<T, BlobError>;

/// An opaque key→stream store.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store a blob, replacing any previous content under the key.
    async fn put(&self, key: &BlobKey, stream: ByteStream) -> Result<()>;

    /// Open a blob for reading.
    async fn get(&self, key: &BlobKey) -> Result<ByteStream>;

    /// Delete a blob. Deleting a missing blob is not an error.
    async fn delete(&self, key: &BlobKey) -> Result<()>;

    /// Whether a blob exists under the key.
    async fn exists(&self, key: &BlobKey) -> Result<bool>;
}
