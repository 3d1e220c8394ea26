/// Vector index plus its position-aligned metadata table.
///
/// `CorpusIndex` owns both halves and guarantees at construction that they have
/// the same length and that the vectors were embedded with the model the
/// process will query with. A corrupt pair never gets as far as serving requests.

pub mod metadata;
pub mod vector;

pub use metadata::{ChunkMetadata, ChunkType, DisplayFields, EntityKey, ProductChunk, RecipeChunk, Source};
pub use vector::{Neighbor, VectorIndex, VectorIndexFile};

use std::path::Path;

use crate::errors::NestragError;

#[derive(Debug, Clone)]
pub struct CorpusIndex {
    vectors: VectorIndex,
    metadata: Vec<ChunkMetadata>,
}

impl CorpusIndex {
    pub fn new(vectors: VectorIndex, metadata: Vec<ChunkMetadata>) -> Result<Self, NestragError> {
        if vectors.len() != metadata.len() {
            return Err(NestragError::InconsistentIndex {
                vectors: vectors.len(),
                metadata: metadata.len(),
            });
        }
        Ok(CorpusIndex { vectors, metadata })
    }

    /// Load both files and verify parity and the pinned embedding model.
    pub fn load(index_path: &Path, metadata_path: &Path, expected_model: &str) -> Result<Self, NestragError> {
        let vectors = VectorIndex::load(index_path)?;
        if vectors.model() != expected_model {
            return Err(NestragError::Config(format!(
                "Vector index at {} was built with model '{}' but the embedding provider is '{}'",
                index_path.display(),
                vectors.model(),
                expected_model
            )));
        }
        let metadata = metadata::load_metadata(metadata_path)?;
        Self::new(vectors, metadata)
    }

    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.vectors.dimension()
    }

    pub fn model(&self) -> &str {
        self.vectors.model()
    }

    pub fn metadata(&self) -> &[ChunkMetadata] {
        &self.metadata
    }

    pub fn get(&self, ordinal: usize) -> Option<&ChunkMetadata> {
        self.metadata.get(ordinal)
    }

    /// Nearest chunks to `query`, joined with their metadata.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(Neighbor, &ChunkMetadata)>, NestragError> {
        self.vectors
            .search(query, k)?
            .into_iter()
            .map(|hit| {
                self.metadata
                    .get(hit.ordinal)
                    .map(|meta| (hit, meta))
                    .ok_or(NestragError::InconsistentIndex {
                        vectors: self.vectors.len(),
                        metadata: self.metadata.len(),
                    })
            })
            .collect()
    }
}
