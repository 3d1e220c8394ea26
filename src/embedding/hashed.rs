/// Deterministic hashed embedding provider
///
/// Maps each lowercase alphanumeric token to a bucket and L2-normalizes the
/// bucket counts. No model download and no network, so it backs offline runs
/// and fixtures. An index built with it carries the model id `hashed-<dim>`.

use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use super::{EmbeddingError, EmbeddingProvider};

pub struct HashedEmbeddingProvider {
    name: String,
    dim: usize,
}

impl HashedEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        let dim = dimension.max(1);
        HashedEmbeddingProvider {
            name: format!("hashed-{}", dim),
            dim,
        }
    }

    /// Synchronous embedding, shared by the async trait method and index fixtures.
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        hashed_embedding(text, self.dim)
    }
}

#[async_trait]
impl EmbeddingProvider for HashedEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.embed_sync(text))
    }

    fn model_name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

fn hashed_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let mut vector = vec![0.0f32; dimension];

    for token in tokens(text) {
        let idx = bucket(&token, dimension);
        if let Some(slot) = vector.get_mut(idx) {
            *slot += 1.0;
        }
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut vector {
            *value /= norm;
        }
    }

    vector
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_lowercase())
}

fn bucket(token: &str, dimension: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    token.hash(&mut hasher);
    (hasher.finish() % dimension as u64) as usize
}
