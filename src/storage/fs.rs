//! Local-directory blob store.
//!
//! Keys map to paths under a root directory, separated with `/` regardless
//! of platform. This is the backend used in development and in tests, where
//! a temp directory stands in for the container.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use walkdir::WalkDir;

use super::{write_atomic, BlobStore};
use crate::core::errors::ApiError;

const STREAM_CHUNK_BYTES: usize = 64 * 1024;

pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn key_path(&self, key: &str) -> PathBuf {
        let mut path = self.root.clone();
        for segment in key.split('/').filter(|s| !s.is_empty()) {
            path.push(segment);
        }
        path
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>, ApiError> {
        let root = self.root.clone();
        let prefix = prefix.to_string();

        tokio::task::spawn_blocking(move || -> Result<Vec<String>, ApiError> {
            if !root.exists() {
                return Ok(Vec::new());
            }

            let mut keys = Vec::new();
            for entry in WalkDir::new(&root) {
                let entry = entry.map_err(ApiError::internal)?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let rel = entry
                    .path()
                    .strip_prefix(&root)
                    .map_err(ApiError::internal)?;
                let key = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.starts_with(&prefix) {
                    keys.push(key);
                }
            }
            keys.sort();
            Ok(keys)
        })
        .await
        .map_err(ApiError::internal)?
    }

    async fn exists(&self, key: &str) -> Result<bool, ApiError> {
        Ok(tokio::fs::metadata(self.key_path(key))
            .await
            .map(|m| m.is_file())
            .unwrap_or(false))
    }

    async fn download(&self, key: &str, local_path: &Path) -> Result<(), ApiError> {
        let source = self.key_path(key);
        let bytes = match tokio::fs::read(&source).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ApiError::NotFound(key.to_string()));
            }
            Err(e) => return Err(ApiError::internal(e)),
        };
        write_atomic(local_path, &bytes).await
    }

    async fn stream(&self, key: &str) -> Result<mpsc::Receiver<Result<Bytes, ApiError>>, ApiError> {
        let path = self.key_path(key);
        let mut file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ApiError::NotFound(key.to_string()));
            }
            Err(e) => return Err(ApiError::internal(e)),
        };

        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            let mut buf = vec![0u8; STREAM_CHUNK_BYTES];
            loop {
                match file.read(&mut buf).await {
                    Ok(0) => return,
                    Ok(n) => {
                        if tx.send(Ok(Bytes::copy_from_slice(&buf[..n]))).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(ApiError::internal(e))).await;
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seed(root: &Path, key: &str, contents: &[u8]) {
        let mut path = root.to_path_buf();
        for segment in key.split('/') {
            path.push(segment);
        }
        tokio::fs::create_dir_all(path.parent().expect("parent"))
            .await
            .expect("mkdir");
        tokio::fs::write(&path, contents).await.expect("write");
    }

    #[tokio::test]
    async fn lists_keys_under_prefix() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsBlobStore::new(dir.path());
        seed(dir.path(), "vectorstores/ACI/2019/aci_318/index.bin", b"x").await;
        seed(dir.path(), "vectorstores/ACI/2019/aci_318/docstore.json", b"y").await;
        seed(dir.path(), "pdfs/ACI/2019/aci_318.pdf", b"z").await;

        let keys = store.list("vectorstores/").await.expect("list");
        assert_eq!(keys.len(), 2);
        assert!(keys.iter().all(|k| k.starts_with("vectorstores/")));

        let all = store.list("").await.expect("list all");
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn missing_root_lists_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsBlobStore::new(dir.path().join("nope"));
        assert!(store.list("").await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn download_copies_and_missing_key_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsBlobStore::new(dir.path());
        seed(dir.path(), "pdfs/doc.pdf", b"pdf bytes").await;

        let target = dir.path().join("out/doc.pdf");
        store.download("pdfs/doc.pdf", &target).await.expect("download");
        assert_eq!(tokio::fs::read(&target).await.expect("read"), b"pdf bytes");

        let missing = store.download("pdfs/other.pdf", &target).await;
        assert!(matches!(missing, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn stream_yields_full_contents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsBlobStore::new(dir.path());
        let payload = vec![7u8; 200_000];
        seed(dir.path(), "pdfs/big.pdf", &payload).await;

        let mut rx = store.stream("pdfs/big.pdf").await.expect("stream");
        let mut collected = Vec::new();
        while let Some(chunk) = rx.recv().await {
            collected.extend_from_slice(&chunk.expect("chunk"));
        }
        assert_eq!(collected, payload);
    }
}
