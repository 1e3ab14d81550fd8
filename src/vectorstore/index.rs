//! Loaded similarity index.
//!
//! `index.bin` holds the vector matrix: a `u32` row count and `u32`
//! dimension (little-endian), then `count * dim` `f32` values row-major.
//! `docstore.json` holds one `{text, page}` record per row, same order.
//!
//! An index is only meaningful when queried with embeddings from the same
//! model that produced it at build time. That contract is documented, not
//! enforced; the one violation this code can see (a dimension mismatch)
//! surfaces as a load-style failure and the query path degrades to an empty
//! result.

use std::cmp::Ordering;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::artifact::{DOCSTORE_FILE, INDEX_FILE};
use crate::core::errors::ApiError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocRecord {
    pub text: String,
    #[serde(default)]
    pub page: Option<u32>,
}

/// One retrieval hit. `distance` is squared L2: lower is better.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub page: Option<u32>,
    pub distance: f32,
}

pub struct LoadedIndex {
    dim: usize,
    vectors: Vec<f32>,
    records: Vec<DocRecord>,
}

impl LoadedIndex {
    /// Load both artifacts from `dir`. Any structural problem (truncated
    /// matrix, unparsable docstore, row-count mismatch) is a `LoadFailure`.
    pub async fn load(dir: &Path) -> Result<Self, ApiError> {
        let index_path = dir.join(INDEX_FILE);
        let raw = tokio::fs::read(&index_path).await.map_err(|e| {
            ApiError::LoadFailure(format!("reading {} failed: {}", index_path.display(), e))
        })?;

        if raw.len() < 8 {
            return Err(ApiError::LoadFailure(format!(
                "{} is too short to hold a header",
                index_path.display()
            )));
        }
        let count = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
        let dim = u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]) as usize;

        let expected = 8 + count
            .checked_mul(dim)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| {
                ApiError::LoadFailure(format!("{} header overflows", index_path.display()))
            })?;
        if raw.len() != expected {
            return Err(ApiError::LoadFailure(format!(
                "{} is {} bytes, expected {} for {} x {} vectors",
                index_path.display(),
                raw.len(),
                expected,
                count,
                dim
            )));
        }
        if count > 0 && dim == 0 {
            return Err(ApiError::LoadFailure(format!(
                "{} declares zero-dimensional vectors",
                index_path.display()
            )));
        }

        let vectors = raw[8..]
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        let docstore_path = dir.join(DOCSTORE_FILE);
        let docstore_raw = tokio::fs::read(&docstore_path).await.map_err(|e| {
            ApiError::LoadFailure(format!("reading {} failed: {}", docstore_path.display(), e))
        })?;
        let records: Vec<DocRecord> = serde_json::from_slice(&docstore_raw).map_err(|e| {
            ApiError::LoadFailure(format!("parsing {} failed: {}", docstore_path.display(), e))
        })?;

        if records.len() != count {
            return Err(ApiError::LoadFailure(format!(
                "docstore has {} records but index has {} vectors",
                records.len(),
                count
            )));
        }

        Ok(Self {
            dim,
            vectors,
            records,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Top-`k` nearest rows to `query` by squared L2 distance, best first.
    ///
    /// Read-only; an index smaller than `k` simply returns fewer results.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievedChunk>, ApiError> {
        if self.records.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != self.dim {
            return Err(ApiError::LoadFailure(format!(
                "query embedding has dimension {} but index was built with {}",
                query.len(),
                self.dim
            )));
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .chunks_exact(self.dim)
            .enumerate()
            .map(|(row, candidate)| (row, l2_squared(query, candidate)))
            .collect();
        scored.sort_by(|left, right| left.1.partial_cmp(&right.1).unwrap_or(Ordering::Equal));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(row, distance)| RetrievedChunk {
                text: self.records[row].text.clone(),
                page: self.records[row].page,
                distance,
            })
            .collect())
    }
}

fn l2_squared(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}
