//! In-memory blob backend for tests.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use crate::{collect, stream_of, BlobError, BlobKey, BlobStore, ByteStream, Result};

/// Test fake holding blobs in a map.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Bytes>>,
}

impl MemoryBlobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    /// Whether the store holds no blobs.
    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &BlobKey, stream: ByteStream) -> Result<()> {
        let data = collect(stream).await?;
        self.blobs.write().insert(key.relative(), data);
        Ok(())
    }

    async fn get(&self, key: &BlobKey) -> Result<ByteStream> {
        let data = self
            .blobs
            .read()
            .get(&key.relative())
            .cloned()
            .ok_or_else(|| BlobError::NotFound(key.relative()))?;
        Ok(stream_of(data))
    }

    async fn delete(&self, key: &BlobKey) -> Result<()> {
        self.blobs.write().remove(&key.relative());
        Ok(())
    }

    async fn exists(&self, key: &BlobKey) -> Result<bool> {
        Ok(self.blobs.read().contains_key(&key.relative()))
    }
}
