//! Object store capability.
//!
//! The rest of the app only sees the `BlobStore` trait: list keys under a
//! prefix, check existence, download a whole object to a local path, or
//! stream its bytes. `AzureBlobStore` talks to a blob container REST
//! endpoint; `FsBlobStore` serves a local directory as the container for
//! development and tests.

mod azure;
mod fs;

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

pub use azure::AzureBlobStore;
pub use fs::FsBlobStore;

use crate::core::errors::ApiError;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// List all object keys starting with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, ApiError>;

    /// Whether an object exists at `key`.
    async fn exists(&self, key: &str) -> Result<bool, ApiError>;

    /// Download the full object at `key` into `local_path`.
    ///
    /// Fails with `ApiError::NotFound` if the object is absent. The write is
    /// not observable at `local_path` until it is complete: implementations
    /// write to a temporary name and rename.
    async fn download(&self, key: &str, local_path: &Path) -> Result<(), ApiError>;

    /// Stream the object's bytes without materializing them.
    async fn stream(&self, key: &str) -> Result<mpsc::Receiver<Result<Bytes, ApiError>>, ApiError>;
}

/// Write `bytes` to `path` via a `.part` sibling and an atomic rename, so a
/// cancelled transfer never leaves a final-named file behind.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ApiError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(ApiError::internal)?;
    }

    let mut part = path.as_os_str().to_owned();
    part.push(".part");
    let part_path = std::path::PathBuf::from(part);

    tokio::fs::write(&part_path, bytes)
        .await
        .map_err(ApiError::internal)?;
    tokio::fs::rename(&part_path, path)
        .await
        .map_err(ApiError::internal)?;
    Ok(())
}
