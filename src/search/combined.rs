/// Combined product + recipe retrieval with coarse intent routing.
///
/// Pools plain vector hits with direct graph text matches, then filters the
/// pool by a keyword-based guess at what the user wants. The guess is
/// best-effort; callers should tolerate the occasional misroute.

use serde::Serialize;
use std::collections::HashSet;

use crate::errors::NestragError;
use crate::graph::{Direction, GraphNode, NodeKind};
use crate::index::{ChunkMetadata, Source};

use super::engine::RetrievalEngine;

const RECIPE_WORDS: [&str; 5] = ["recipe", "cook", "bake", "make", "prepare"];
const PRODUCT_WORDS: [&str; 7] = ["product", "buy", "price", "brand", "category", "flavour", "flavor"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryIntent {
    Product,
    Recipe,
    Both,
}

/// Substring keyword match; recipe words win over product words.
pub fn classify_intent(query: &str) -> QueryIntent {
    let q = query.to_lowercase();
    if RECIPE_WORDS.iter().any(|w| q.contains(w)) {
        QueryIntent::Recipe
    } else if PRODUCT_WORDS.iter().any(|w| q.contains(w)) {
        QueryIntent::Product
    } else {
        QueryIntent::Both
    }
}

/// One pooled hit, from either the vector index or the graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CombinedHit {
    Chunk(ChunkMetadata),
    GraphProduct {
        name: String,
        url: Option<String>,
        description: Option<String>,
    },
    GraphRecipe {
        title: String,
        url: Option<String>,
    },
}

impl CombinedHit {
    pub fn source(&self) -> Source {
        match self {
            CombinedHit::Chunk(meta) => meta.source(),
            CombinedHit::GraphProduct { .. } => Source::Product,
            CombinedHit::GraphRecipe { .. } => Source::Recipe,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            CombinedHit::Chunk(meta) => meta.entity_name(),
            CombinedHit::GraphProduct { name, .. } => name,
            CombinedHit::GraphRecipe { title, .. } => title,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            CombinedHit::Chunk(meta) => meta.url(),
            CombinedHit::GraphProduct { url, .. } | CombinedHit::GraphRecipe { url, .. } => url.as_deref(),
        }
    }

    pub fn origin(&self) -> &'static str {
        match self {
            CombinedHit::Chunk(_) => "vector",
            CombinedHit::GraphProduct { .. } | CombinedHit::GraphRecipe { .. } => "graph",
        }
    }

    fn keep(&self, intent: QueryIntent) -> bool {
        match intent {
            QueryIntent::Both => true,
            QueryIntent::Product => self.source() == Source::Product,
            QueryIntent::Recipe => self.source() == Source::Recipe,
        }
    }
}

impl From<GraphNode> for CombinedHit {
    fn from(node: GraphNode) -> Self {
        match node.kind {
            NodeKind::Recipe => CombinedHit::GraphRecipe {
                title: node.name,
                url: node.url,
            },
            _ => CombinedHit::GraphProduct {
                name: node.name,
                url: node.url,
                description: node.description,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CombinedResults {
    pub intent: QueryIntent,
    pub hits: Vec<CombinedHit>,
}

impl RetrievalEngine {
    /// Vector hits plus graph text matches, filtered by detected intent.
    ///
    /// Unlike `retrieve`, hits are not deduplicated or reranked: vector hits
    /// come first in distance order, then graph products, then graph recipes.
    pub async fn combined_retrieve(&self, query: &str, top_k: usize) -> Result<CombinedResults, NestragError> {
        let intent = classify_intent(query);
        let query = query.trim();
        if query.is_empty() || top_k == 0 {
            return Ok(CombinedResults {
                intent,
                hits: Vec::new(),
            });
        }

        let (vector, graph) = self
            .with_deadline(async {
                let (vector, graph) = tokio::join!(self.vector_hits(query, top_k), self.graph_hits(query, top_k));
                Ok::<_, NestragError>((vector?, graph?))
            })
            .await?;

        let hits: Vec<CombinedHit> = vector.into_iter().chain(graph).filter(|h| h.keep(intent)).collect();
        tracing::debug!(?intent, hits = hits.len(), "Combined retrieval complete");
        Ok(CombinedResults { intent, hits })
    }

    async fn vector_hits(&self, query: &str, top_k: usize) -> Result<Vec<CombinedHit>, NestragError> {
        let ctx = self.context();
        if ctx.index().is_empty() {
            return Ok(Vec::new());
        }
        let vector = ctx.embedder().embed(query).await?;
        Ok(ctx
            .index()
            .search(&vector, top_k)?
            .into_iter()
            .map(|(_, meta)| CombinedHit::Chunk(meta.clone()))
            .collect())
    }

    async fn graph_hits(&self, query: &str, top_k: usize) -> Result<Vec<CombinedHit>, NestragError> {
        let graph = self.context().graph();
        let matched = graph.search_nodes(NodeKind::Product, query, usize::MAX).await?;

        let mut seen = HashSet::new();
        let mut recipes = Vec::new();
        'products: for product in &matched {
            for recipe in graph
                .neighbors_with_type(&product.name, NodeKind::Recipe, Direction::Outgoing)
                .await?
            {
                if recipes.len() >= top_k {
                    break 'products;
                }
                if seen.insert(recipe.name.clone()) {
                    recipes.push(recipe);
                }
            }
        }

        Ok(matched
            .into_iter()
            .take(top_k)
            .chain(recipes)
            .map(CombinedHit::from)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_intent_table() {
        assert_eq!(classify_intent("How do I bake cookies?"), QueryIntent::Recipe);
        assert_eq!(classify_intent("Recipe with KitKat"), QueryIntent::Recipe);
        assert_eq!(classify_intent("Which brand makes Aero?"), QueryIntent::Recipe);
        assert_eq!(classify_intent("What flavours of Aero can I buy?"), QueryIntent::Product);
        assert_eq!(classify_intent("Aero price"), QueryIntent::Product);
        assert_eq!(classify_intent("Aero chocolate"), QueryIntent::Both);
    }

    #[test]
    fn test_hit_from_graph_node() {
        let mut node = GraphNode::new("Nut Brownies", NodeKind::Recipe);
        node.url = Some("https://example.test/brownies".to_string());
        let hit = CombinedHit::from(node);
        assert_eq!(hit.source(), Source::Recipe);
        assert_eq!(hit.label(), "Nut Brownies");
        assert_eq!(hit.url(), Some("https://example.test/brownies"));
        assert_eq!(hit.origin(), "graph");
        assert!(hit.keep(QueryIntent::Recipe));
        assert!(!hit.keep(QueryIntent::Product));
    }
}
