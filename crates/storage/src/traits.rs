//! The object store seam.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StorageResult;

/// Flat key/value blob store. Keys are `/`-separated relative paths.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Fails with `NotFound` when the key is absent.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Write `data` at `key`, replacing any previous object.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    fn backend_name(&self) -> &'static str;
}
