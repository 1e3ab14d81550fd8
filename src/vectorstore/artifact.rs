//! On-disk materialization of index artifacts.
//!
//! A document's index is the pair `index.bin` + `docstore.json` under
//! `{vectorstore_prefix}/{doc_id}/` in the object store. The local copy is
//! only trusted when both files are present; a half-materialized directory
//! (one file, or `.part` leftovers from an aborted download) reads as
//! uncached and the next request re-fetches what is missing.

use std::path::{Path, PathBuf};

use crate::core::errors::ApiError;
use crate::storage::BlobStore;

pub const INDEX_FILE: &str = "index.bin";
pub const DOCSTORE_FILE: &str = "docstore.json";

const ARTIFACT_SUFFIXES: [&str; 2] = [".bin", ".json"];

/// Filesystem-safe cache directory name for a document id. Path separators
/// collapse to `__`, which cannot occur in a single key segment, so distinct
/// ids cannot collide and the id cannot escape the cache root.
pub fn cache_dir_name(doc_id: &str) -> String {
    doc_id.replace('\\', "/").replace('/', "__")
}

pub fn is_cached(local_dir: &Path) -> bool {
    local_dir.join(INDEX_FILE).is_file() && local_dir.join(DOCSTORE_FILE).is_file()
}

/// Ensure the document's artifacts exist under `local_dir`, downloading any
/// that are missing.
///
/// Returns `false` when the object store has no artifacts under the
/// document's prefix. That is the "document has no index" condition, which
/// callers surface as an empty result rather than an error.
pub async fn ensure_local(
    blob: &dyn BlobStore,
    vectorstore_prefix: &str,
    doc_id: &str,
    local_dir: &Path,
) -> Result<bool, ApiError> {
    if is_cached(local_dir) {
        return Ok(true);
    }

    let prefix = format!(
        "{}/{}/",
        vectorstore_prefix.trim_matches('/'),
        doc_id.trim_matches('/')
    );
    let keys = blob.list(&prefix).await.map_err(|e| {
        tracing::error!("artifact listing for '{}' failed: {}", prefix, e);
        e
    })?;

    let artifacts: Vec<&String> = keys
        .iter()
        .filter(|key| ARTIFACT_SUFFIXES.iter().any(|s| key.ends_with(s)))
        .collect();
    if artifacts.is_empty() {
        return Ok(false);
    }

    tokio::fs::create_dir_all(local_dir)
        .await
        .map_err(ApiError::internal)?;

    for key in artifacts {
        let name = key.rsplit('/').next().unwrap_or(key.as_str());
        let target: PathBuf = local_dir.join(name);
        if tokio::fs::metadata(&target).await.is_ok() {
            continue;
        }
        tracing::info!("downloading {}", key);
        blob.download(key, &target).await.map_err(|e| {
            tracing::error!("download of '{}' failed: {}", key, e);
            e
        })?;
    }

    Ok(is_cached(local_dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryBlobStore;
    use crate::vectorstore::fixtures;

    fn seeded_store(doc_id: &str) -> MemoryBlobStore {
        let store = MemoryBlobStore::new();
        let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let records = vec![
            fixtures::record("chunk a", Some(1)),
            fixtures::record("chunk b", Some(2)),
        ];
        store.put(
            &format!("vectorstores/{}/index.bin", doc_id),
            fixtures::encode_index(&vectors),
        );
        store.put(
            &format!("vectorstores/{}/docstore.json", doc_id),
            fixtures::encode_docstore(&records),
        );
        store
    }

    #[test]
    fn cache_dir_name_flattens_separators() {
        assert_eq!(cache_dir_name("ACI/2019/aci_318"), "ACI__2019__aci_318");
        assert_eq!(cache_dir_name("ACI\\2019\\aci_318"), "ACI__2019__aci_318");
        assert_eq!(cache_dir_name("../escape"), "..__escape");
    }

    #[tokio::test]
    async fn materializes_both_artifacts() {
        let store = seeded_store("ACI/2019/aci_318");
        let dir = tempfile::tempdir().expect("tempdir");
        let local = dir.path().join(cache_dir_name("ACI/2019/aci_318"));

        let present = ensure_local(&store, "vectorstores", "ACI/2019/aci_318", &local)
            .await
            .expect("ensure");
        assert!(present);
        assert!(is_cached(&local));
        assert_eq!(store.download_count(), 2);
    }

    #[tokio::test]
    async fn second_call_downloads_nothing() {
        let store = seeded_store("ACI/2019/aci_318");
        let dir = tempfile::tempdir().expect("tempdir");
        let local = dir.path().join("cache");

        ensure_local(&store, "vectorstores", "ACI/2019/aci_318", &local)
            .await
            .expect("ensure");
        ensure_local(&store, "vectorstores", "ACI/2019/aci_318", &local)
            .await
            .expect("ensure again");
        assert_eq!(store.download_count(), 2);
    }

    #[tokio::test]
    async fn missing_remote_artifacts_is_not_an_error() {
        let store = MemoryBlobStore::new();
        let dir = tempfile::tempdir().expect("tempdir");
        let local = dir.path().join("cache");

        let present = ensure_local(&store, "vectorstores", "NO/SUCH/doc", &local)
            .await
            .expect("ensure");
        assert!(!present);
        assert!(!is_cached(&local));
    }

    #[tokio::test]
    async fn partial_local_copy_is_not_cached_and_is_repaired() {
        let store = seeded_store("ACI/2019/aci_318");
        let dir = tempfile::tempdir().expect("tempdir");
        let local = dir.path().join("cache");

        // Simulate an aborted earlier materialization: only the index file
        // made it to disk.
        tokio::fs::create_dir_all(&local).await.expect("mkdir");
        tokio::fs::write(local.join(INDEX_FILE), b"stale").await.expect("write");
        assert!(!is_cached(&local));

        let present = ensure_local(&store, "vectorstores", "ACI/2019/aci_318", &local)
            .await
            .expect("ensure");
        assert!(present);
        // Only the missing docstore was fetched.
        assert_eq!(store.download_count(), 1);
    }
}
