//! Blob storage.
//!
//! Documents' bytes live outside the document store, keyed by an opaque path.
//! Two backends: an in-memory map for tests and a filesystem store that keys
//! blobs by UUID plus an extension guessed from the content type.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::BlobError;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write a blob and return its storage path.
    async fn put(&self, bytes: Bytes, content_type: &str) -> Result<String, BlobError>;

    /// Delete a blob. Returns `false` when it was already absent, which
    /// callers treat as success (deletes are idempotent).
    async fn delete(&self, path: &str) -> Result<bool, BlobError>;

    async fn read(&self, path: &str) -> Result<Bytes, BlobError>;
}

fn storage_key(content_type: &str) -> String {
    let ext = mime_guess::get_mime_extensions_str(content_type)
        .and_then(|exts| exts.first())
        .copied()
        .unwrap_or("bin");
    format!("{}.{ext}", Uuid::new_v4())
}

/// In-memory blob store.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Bytes>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }

    pub async fn contains(&self, path: &str) -> bool {
        self.blobs.read().await.contains_key(path)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, bytes: Bytes, content_type: &str) -> Result<String, BlobError> {
        let key = storage_key(content_type);
        self.blobs.write().await.insert(key.clone(), bytes);
        Ok(key)
    }

    async fn delete(&self, path: &str) -> Result<bool, BlobError> {
        Ok(self.blobs.write().await.remove(path).is_some())
    }

    async fn read(&self, path: &str) -> Result<Bytes, BlobError> {
        self.blobs
            .read()
            .await
            .get(path)
            .cloned()
            .ok_or(BlobError::NotFound)
    }
}

/// Filesystem-backed blob store rooted at a single directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, BlobError> {
        // Keys are UUID-based file names; reject anything that could walk
        // outside the root.
        if path.contains('/') || path.contains('\\') || path.contains("..") {
            return Err(BlobError::Io(format!("invalid blob key '{path}'")));
        }
        Ok(self.root.join(path))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, bytes: Bytes, content_type: &str) -> Result<String, BlobError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| BlobError::Io(e.to_string()))?;
        let key = storage_key(content_type);
        let target = self.resolve(&key)?;
        tokio::fs::write(&target, &bytes)
            .await
            .map_err(|e| BlobError::Io(e.to_string()))?;
        Ok(key)
    }

    async fn delete(&self, path: &str) -> Result<bool, BlobError> {
        let target = self.resolve(path)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(BlobError::Io(e.to_string())),
        }
    }

    async fn read(&self, path: &str) -> Result<Bytes, BlobError> {
        let target = self.resolve(path)?;
        match tokio::fs::read(&target).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(BlobError::NotFound),
            Err(e) => Err(BlobError::Io(e.to_string())),
        }
    }
}
