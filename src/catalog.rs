//! Document catalog.
//!
//! The browsable catalog (category -> year -> documents) is derived from the
//! object store by scanning for vector-index artifacts under the vectorstore
//! prefix. A key like `vectorstores/ACI_Codes/2019/aci_318/index.bin` yields
//! the document id `ACI_Codes/2019/aci_318`, category `ACI_Codes`, year
//! `2019` and label `aci_318`; the PDF for that document is expected at
//! `{pdf_prefix}/ACI_Codes/2019/aci_318.pdf`.
//!
//! The catalog is rebuilt wholesale (startup and explicit refresh) and
//! swapped atomically; readers always see a complete snapshot.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

use crate::core::errors::ApiError;
use crate::storage::BlobStore;
use crate::vectorstore::artifact::INDEX_FILE;

#[derive(Debug, Clone, Serialize)]
pub struct CatalogEntry {
    pub id: String,
    pub label: String,
    pub year: String,
    pub pdf_rel_path: String,
}

/// category -> year -> entries, ordered at every level for stable dropdowns.
pub type Catalog = BTreeMap<String, BTreeMap<String, Vec<CatalogEntry>>>;

/// Build a catalog by listing vector-index artifacts under `prefix`.
///
/// A failed listing fails the whole build; a transient error mid-scan must
/// not silently produce a truncated catalog.
pub async fn build_catalog(blob: &dyn BlobStore, prefix: &str) -> Result<Catalog, ApiError> {
    let prefix = format!("{}/", prefix.trim_matches('/'));
    let keys = blob.list(&prefix).await.map_err(|e| {
        ApiError::CatalogUnavailable(format!("listing '{}' failed: {}", prefix, e))
    })?;

    let suffix = format!("/{}", INDEX_FILE);
    let mut catalog = Catalog::new();

    for key in &keys {
        let Some(rest) = key.strip_prefix(&prefix) else {
            continue;
        };
        let Some(doc_id) = rest.strip_suffix(&suffix) else {
            continue;
        };
        if doc_id.is_empty() {
            continue;
        }

        let parts: Vec<&str> = doc_id.split('/').filter(|p| !p.is_empty()).collect();
        let Some(category) = parts.first() else {
            continue;
        };
        let year = parts.get(1).copied().unwrap_or("root");
        let label = if parts.len() > 2 {
            parts[2..].join("/")
        } else {
            parts[parts.len() - 1].to_string()
        };

        catalog
            .entry(category.to_string())
            .or_default()
            .entry(year.to_string())
            .or_default()
            .push(CatalogEntry {
                id: doc_id.to_string(),
                label,
                year: year.to_string(),
                pdf_rel_path: format!("{}.pdf", doc_id),
            });
    }

    for years in catalog.values_mut() {
        for entries in years.values_mut() {
            entries.sort_by(|a, b| a.label.cmp(&b.label));
        }
    }

    Ok(catalog)
}

/// Holds the current catalog snapshot and swaps it atomically on refresh.
pub struct CatalogService {
    current: RwLock<Arc<Catalog>>,
}

impl CatalogService {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(Catalog::new())),
        }
    }

    pub async fn snapshot(&self) -> Arc<Catalog> {
        self.current.read().await.clone()
    }

    /// Rebuild from the object store and swap in the result.
    ///
    /// On failure the previous snapshot is retained untouched and the error
    /// is returned to the caller. Returns the document count on success.
    pub async fn refresh(&self, blob: &dyn BlobStore, prefix: &str) -> Result<usize, ApiError> {
        let rebuilt = build_catalog(blob, prefix).await?;
        let count = rebuilt
            .values()
            .flat_map(|years| years.values())
            .map(|entries| entries.len())
            .sum();

        *self.current.write().await = Arc::new(rebuilt);
        tracing::info!("catalog refreshed: {} documents", count);
        Ok(count)
    }

    pub async fn doc_info(&self, doc_id: &str) -> Option<CatalogEntry> {
        let snapshot = self.snapshot().await;
        snapshot
            .values()
            .flat_map(|years| years.values())
            .flat_map(|entries| entries.iter())
            .find(|entry| entry.id == doc_id)
            .cloned()
    }
}

impl Default for CatalogService {
    fn default() -> Self {
        Self::new()
    }
}
