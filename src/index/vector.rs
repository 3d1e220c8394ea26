/// Exact nearest-neighbour search over the pre-computed chunk embeddings.
///
/// Flat squared-L2 scan over every stored vector (the corpus is small enough
/// that exhaustive search is cheap), so results are exact and deterministic.
/// The index is append-only and rebuilt wholesale by the build job; this type
/// only reads it.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::NestragError;

/// On-disk form written by the index build job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndexFile {
    /// Embedding model the vectors were produced with
    pub model: String,
    pub dimension: usize,
    pub vectors: Vec<Vec<f32>>,
}

/// One search hit: position in the index plus squared L2 distance (lower = closer).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub ordinal: usize,
    pub distance: f32,
}

/// Row-major flat vector store.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    model: String,
    dimension: usize,
    data: Vec<f32>,
}

impl VectorIndex {
    /// Build an index from row vectors, rejecting any row of the wrong width.
    pub fn new(model: impl Into<String>, dimension: usize, vectors: Vec<Vec<f32>>) -> Result<Self, NestragError> {
        if dimension == 0 {
            return Err(NestragError::Config("Vector index dimension must be positive".to_string()));
        }

        let mut data = Vec::with_capacity(vectors.len() * dimension);
        for row in vectors {
            if row.len() != dimension {
                return Err(NestragError::DimensionMismatch {
                    expected: dimension,
                    actual: row.len(),
                });
            }
            data.extend(row);
        }

        Ok(VectorIndex {
            model: model.into(),
            dimension,
            data,
        })
    }

    pub fn load(path: &Path) -> Result<Self, NestragError> {
        let raw = std::fs::read_to_string(path).map_err(|e| NestragError::load(path, "vector index", e))?;
        let file: VectorIndexFile =
            serde_json::from_str(&raw).map_err(|e| NestragError::load(path, "vector index", e))?;
        Self::new(file.model, file.dimension, file.vectors)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Return the `k` nearest vectors to `query`, closest first.
    ///
    /// `k` larger than the index is clamped; equal distances are ordered by ordinal.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, NestragError> {
        if query.len() != self.dimension {
            return Err(NestragError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let k = k.min(self.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut hits: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(ordinal, row)| Neighbor {
                ordinal,
                distance: squared_l2(row, query),
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.ordinal.cmp(&b.ordinal))
        });
        hits.truncate(k);
        Ok(hits)
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
