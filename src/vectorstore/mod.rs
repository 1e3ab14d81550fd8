//! Per-document vector index cache and retrieval.
//!
//! Each document's similarity index lives in the object store as a pair of
//! artifacts (vector matrix + docstore). `artifact` materializes them into
//! a local cache directory, `index` loads and queries them, and `manager`
//! coordinates both behind an in-memory cache with per-document
//! mutual exclusion.

pub mod artifact;
pub mod index;
pub mod manager;

pub use index::{LoadedIndex, RetrievedChunk};
pub use manager::VectorstoreManager;

#[cfg(test)]
pub(crate) mod fixtures {
    //! Serializes artifacts in the on-disk/on-store format for tests.

    use crate::vectorstore::index::DocRecord;

    pub fn encode_index(vectors: &[Vec<f32>]) -> Vec<u8> {
        let count = vectors.len() as u32;
        let dim = vectors.first().map(|v| v.len()).unwrap_or(0) as u32;
        let mut out = Vec::with_capacity(8 + vectors.len() * dim as usize * 4);
        out.extend_from_slice(&count.to_le_bytes());
        out.extend_from_slice(&dim.to_le_bytes());
        for row in vectors {
            for value in row {
                out.extend_from_slice(&value.to_le_bytes());
            }
        }
        out
    }

    pub fn encode_docstore(records: &[DocRecord]) -> Vec<u8> {
        serde_json::to_vec(records).expect("docstore json")
    }

    pub fn record(text: &str, page: Option<u32>) -> DocRecord {
        DocRecord {
            text: text.to_string(),
            page,
        }
    }
}
