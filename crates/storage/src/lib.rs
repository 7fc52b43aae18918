//! Artifact storage for generated images.
//!
//! Reconciled outputs are copied out of the engine and written through an
//! [`ObjectStore`]: a local directory in development, an S3-compatible
//! bucket in production.

pub mod backends;
pub mod config;
pub mod error;
pub mod traits;

pub use backends::{filesystem::FilesystemBackend, memory::MemoryBackend, s3::S3Backend};
pub use config::StorageConfig;
pub use error::{StorageError, StorageResult};
pub use traits::ObjectStore;

use std::sync::Arc;

use atelier_core::types::DbId;

/// Create an object store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Filesystem { root } => Ok(Arc::new(FilesystemBackend::new(root).await?)),
        StorageConfig::S3 {
            bucket,
            region,
            endpoint,
            prefix,
        } => {
            let backend =
                S3Backend::new(bucket, region.clone(), endpoint.clone(), prefix.clone()).await?;
            Ok(Arc::new(backend))
        }
    }
}

/// Key under which a job's output file is stored.
///
/// Path separators in `filename` are flattened so one engine output always
/// maps to exactly one object.
pub fn storage_key(user_id: DbId, prompt_id: &str, filename: &str) -> String {
    let name = filename.replace(['/', '\\'], "_");
    format!("{user_id}/{prompt_id}/{name}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tempfile::tempdir;

    #[test]
    fn storage_key_layout() {
        assert_eq!(storage_key(7, "abc", "result1.png"), "7/abc/result1.png");
        assert_eq!(storage_key(7, "abc", "sub/x.png"), "7/abc/sub_x.png");
    }

    #[tokio::test]
    async fn from_config_filesystem_ok() {
        let temp = tempdir().unwrap();
        let config = StorageConfig::Filesystem {
            root: temp.path().join("store"),
        };

        let store = from_config(&config).await.unwrap();
        assert_eq!(store.backend_name(), "filesystem");
        store
            .put(&storage_key(1, "p", "a.png"), Bytes::from_static(b"hi"))
            .await
            .unwrap();
        assert!(store.exists("1/p/a.png").await.unwrap());
    }

    #[tokio::test]
    async fn from_config_rejects_blank_bucket() {
        let config = StorageConfig::S3 {
            bucket: " ".into(),
            region: None,
            endpoint: None,
            prefix: None,
        };
        match from_config(&config).await {
            Ok(_) => panic!("expected error"),
            Err(StorageError::Config(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn memory_backend_round_trip() {
        let store = MemoryBackend::new();
        store.put("k", Bytes::from_static(b"v")).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Bytes::from_static(b"v"));
        assert_eq!(store.keys(), vec!["k".to_string()]);
        store.delete("k").await.unwrap();
        assert!(matches!(store.get("k").await, Err(StorageError::NotFound(_))));
    }
}
