//! In-memory index cache with per-document materialization locks.
//!
//! Once loaded, an index is immutable and shared as an `Arc`; reads take no
//! lock beyond the cache map's read guard. The cold path (download + load)
//! is serialized per document id so concurrent first requests do exactly one
//! materialization, while requests for different documents proceed
//! independently. Neither map evicts: both are keyed by document id, so
//! their cardinality is bounded by the catalog, not by query volume.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use super::artifact;
use super::index::LoadedIndex;
use crate::core::errors::ApiError;
use crate::storage::BlobStore;

pub struct VectorstoreManager {
    blob: Arc<dyn BlobStore>,
    vectorstore_prefix: String,
    cache_root: PathBuf,
    loaded: RwLock<HashMap<String, Arc<LoadedIndex>>>,
    materializing: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl VectorstoreManager {
    pub fn new(
        blob: Arc<dyn BlobStore>,
        vectorstore_prefix: impl Into<String>,
        cache_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            blob,
            vectorstore_prefix: vectorstore_prefix.into(),
            cache_root: cache_root.into(),
            loaded: RwLock::new(HashMap::new()),
            materializing: Mutex::new(HashMap::new()),
        }
    }

    pub fn local_dir(&self, doc_id: &str) -> PathBuf {
        self.cache_root.join(artifact::cache_dir_name(doc_id))
    }

    pub fn is_cached(&self, doc_id: &str) -> bool {
        artifact::is_cached(&self.local_dir(doc_id))
    }

    /// The per-document lock, created on first use. The registry lock is
    /// only held to fetch the entry, never across I/O.
    async fn materialization_lock(&self, doc_id: &str) -> Arc<Mutex<()>> {
        let mut registry = self.materializing.lock().await;
        registry
            .entry(doc_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Get the loaded index for `doc_id`, materializing and loading it on
    /// first use.
    ///
    /// `Ok(None)` means the object store has no artifacts for this document.
    /// A corrupt artifact propagates as `LoadFailure`; callers on the query
    /// path log it and degrade to an empty result.
    pub async fn get_index(&self, doc_id: &str) -> Result<Option<Arc<LoadedIndex>>, ApiError> {
        if let Some(index) = self.loaded.read().await.get(doc_id) {
            return Ok(Some(index.clone()));
        }

        let lock = self.materialization_lock(doc_id).await;
        let _guard = lock.lock().await;

        // Another request may have finished while we waited on the guard.
        if let Some(index) = self.loaded.read().await.get(doc_id) {
            return Ok(Some(index.clone()));
        }

        let local_dir = self.local_dir(doc_id);
        let present = artifact::ensure_local(
            self.blob.as_ref(),
            &self.vectorstore_prefix,
            doc_id,
            &local_dir,
        )
        .await?;
        if !present {
            tracing::info!("no index artifacts for '{}'", doc_id);
            return Ok(None);
        }

        let index = Arc::new(LoadedIndex::load(&local_dir).await?);
        tracing::info!(
            "loaded index for '{}' ({} chunks, dim {})",
            doc_id,
            index.len(),
            index.dim()
        );

        self.loaded
            .write()
            .await
            .insert(doc_id.to_string(), index.clone());
        Ok(Some(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryBlobStore;
    use crate::vectorstore::fixtures;

    const DOC: &str = "ACI/2019/aci_318";

    fn seeded_store() -> Arc<MemoryBlobStore> {
        let store = MemoryBlobStore::new();
        store.put(
            &format!("vectorstores/{}/index.bin", DOC),
            fixtures::encode_index(&[vec![1.0, 0.0], vec![0.0, 1.0]]),
        );
        store.put(
            &format!("vectorstores/{}/docstore.json", DOC),
            fixtures::encode_docstore(&[
                fixtures::record("east", Some(1)),
                fixtures::record("north", Some(2)),
            ]),
        );
        Arc::new(store)
    }

    #[tokio::test]
    async fn cold_then_warm_does_one_download_pass() {
        let store = seeded_store();
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = VectorstoreManager::new(store.clone(), "vectorstores", dir.path());

        assert!(!manager.is_cached(DOC));
        let first = manager.get_index(DOC).await.expect("get").expect("index");
        assert!(manager.is_cached(DOC));
        assert_eq!(store.download_count(), 2);

        let second = manager.get_index(DOC).await.expect("get").expect("index");
        assert_eq!(store.download_count(), 2);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn concurrent_cold_requests_materialize_once() {
        let store = seeded_store();
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = Arc::new(VectorstoreManager::new(
            store.clone(),
            "vectorstores",
            dir.path(),
        ));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move {
                manager.get_index(DOC).await.expect("get").expect("index")
            }));
        }

        let mut indexes = Vec::new();
        for handle in handles {
            indexes.push(handle.await.expect("join"));
        }

        // One download of each artifact, one loaded instance shared by all.
        assert_eq!(store.download_count(), 2);
        for index in &indexes[1..] {
            assert!(Arc::ptr_eq(&indexes[0], index));
        }
    }

    #[tokio::test]
    async fn absent_document_yields_none() {
        let store = Arc::new(MemoryBlobStore::new());
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = VectorstoreManager::new(store, "vectorstores", dir.path());

        let result = manager.get_index("NO/SUCH/doc").await.expect("get");
        assert!(result.is_none());
        assert!(!manager.is_cached("NO/SUCH/doc"));
    }

    #[tokio::test]
    async fn corrupt_artifact_surfaces_load_failure() {
        let store = MemoryBlobStore::new();
        store.put(&format!("vectorstores/{}/index.bin", DOC), b"garbage".to_vec());
        store.put(
            &format!("vectorstores/{}/docstore.json", DOC),
            fixtures::encode_docstore(&[fixtures::record("a", None)]),
        );
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = VectorstoreManager::new(Arc::new(store), "vectorstores", dir.path());

        let err = manager.get_index(DOC).await;
        assert!(matches!(err, Err(ApiError::LoadFailure(_))));
    }

    #[tokio::test]
    async fn distinct_documents_do_not_share_cache_dirs() {
        let store = MemoryBlobStore::new();
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = VectorstoreManager::new(Arc::new(store), "vectorstores", dir.path());

        let a = manager.local_dir("ACI/2019/main");
        let b = manager.local_dir("ACI/2019_main");
        assert_ne!(a, b);
        assert!(a.starts_with(dir.path()));
        assert!(b.starts_with(dir.path()));
    }
}
