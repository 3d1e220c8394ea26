/// Graph-derived relevance boost
///
/// Rewards candidates the product graph says are related to the anchor (the
/// best semantic hit): same brand, same category, or a shared ingredient that
/// is distinctive enough to mean something. Contributions are additive:
///
/// | condition          | boost |
/// |--------------------|-------|
/// | same brand         | 0.3   |
/// | same category      | 0.3   |
/// | shared ingredient  | 0.4   |

use std::collections::{HashMap, HashSet};

use crate::errors::NestragError;
use crate::graph::GraphReader;
use crate::index::{ChunkMetadata, EntityKey};
use crate::store::RecordStore;

pub const BRAND_BOOST: f32 = 0.3;
pub const CATEGORY_BOOST: f32 = 0.3;
pub const INGREDIENT_BOOST: f32 = 0.4;

/// Low-information ingredients that never count as a shared ingredient.
pub const COMMON_INGREDIENTS: [&str; 11] = [
    "sugar",
    "salt",
    "water",
    "milk",
    "glucose",
    "cocoa",
    "soy lecithin",
    "natural flavour",
    "vanillin",
    "lactose",
    "modified milk ingredients",
];

pub fn normalize_ingredient(name: &str) -> String {
    name.trim().to_lowercase()
}

pub fn is_common_ingredient(name: &str) -> bool {
    let name = normalize_ingredient(name);
    COMMON_INGREDIENTS.contains(&name.as_str())
}

/// Boost for one combination of firing conditions.
pub fn boost_score(same_brand: bool, same_category: bool, shared_ingredient: bool) -> f32 {
    let mut boost = 0.0;
    if same_brand {
        boost += BRAND_BOOST;
    }
    if same_category {
        boost += CATEGORY_BOOST;
    }
    if shared_ingredient {
        boost += INGREDIENT_BOOST;
    }
    boost.min(1.0)
}

/// Distinctive ingredient successors of an entity, normalized.
pub async fn distinctive_ingredients(graph: &dyn GraphReader, name: &str) -> Result<HashSet<String>, NestragError> {
    Ok(graph
        .ingredients_of(name)
        .await?
        .iter()
        .map(|i| normalize_ingredient(i))
        .filter(|i| !is_common_ingredient(i))
        .collect())
}

/// Reference point for boost comparisons.
#[derive(Debug, Clone)]
pub struct Anchor {
    pub key: EntityKey,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub ingredients: HashSet<String>,
}

impl Anchor {
    /// Resolve the anchor from its chunk. A structured record, when present, is
    /// authoritative for brand and category (blank values included); otherwise
    /// the chunk's own fields are used.
    pub async fn resolve(
        meta: &ChunkMetadata,
        records: &RecordStore,
        graph: &dyn GraphReader,
    ) -> Result<Self, NestragError> {
        let record = records.get(meta.source(), meta.entity_name());
        let (brand, category) = match record {
            Some(r) => (r.brand(), r.category()),
            None => (meta.brand_field(), meta.category_field()),
        };
        let brand = brand.map(str::to_string);
        let category = category.map(str::to_string);

        if record.is_none() {
            tracing::debug!(anchor = %meta.entity_name(), "No structured record for anchor, using chunk fields");
        }

        Ok(Anchor {
            key: meta.entity_key(),
            brand,
            category,
            ingredients: distinctive_ingredients(graph, meta.entity_name()).await?,
        })
    }
}

/// Scores candidates against one anchor, fetching each entity's ingredients once.
pub struct BoostScorer<'a> {
    anchor: &'a Anchor,
    graph: &'a dyn GraphReader,
    ingredients: HashMap<String, HashSet<String>>,
}

impl<'a> BoostScorer<'a> {
    pub fn new(anchor: &'a Anchor, graph: &'a dyn GraphReader) -> Self {
        BoostScorer {
            anchor,
            graph,
            ingredients: HashMap::new(),
        }
    }

    pub async fn score(&mut self, candidate: &ChunkMetadata) -> Result<f32, NestragError> {
        let same_brand = matches(candidate.brand_field(), self.anchor.brand.as_deref());
        let same_category = matches(candidate.category_field(), self.anchor.category.as_deref());

        let shared_ingredient = if self.anchor.ingredients.is_empty() {
            false
        } else {
            let name = candidate.entity_name();
            if !self.ingredients.contains_key(name) {
                let found = distinctive_ingredients(self.graph, name).await?;
                self.ingredients.insert(name.to_string(), found);
            }
            self.ingredients
                .get(name)
                .is_some_and(|set| !set.is_disjoint(&self.anchor.ingredients))
        };

        Ok(boost_score(same_brand, same_category, shared_ingredient))
    }
}

/// Field equality on trimmed values. Equal blanks match; a missing field never does.
fn matches(candidate: Option<&str>, anchor: Option<&str>) -> bool {
    match (candidate, anchor) {
        (Some(c), Some(a)) => c == a,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeKind, GraphNode, InMemoryGraph, NodeKind};
    use crate::store::ProductRecord;

    fn chunk(name: &str, brand: &str, category: &str) -> ChunkMetadata {
        serde_json::from_value(serde_json::json!({
            "chunk_type": "overview",
            "product_name": name,
            "brand": brand,
            "category": category,
        }))
        .unwrap()
    }

    fn graph(links: &[(&str, &[&str])]) -> InMemoryGraph {
        let mut g = InMemoryGraph::new();
        for (product, ingredients) in links {
            g.add_node(GraphNode::new(*product, NodeKind::Product));
            for i in ingredients.iter() {
                g.add_node(GraphNode::new(*i, NodeKind::Ingredient));
                g.add_edge(product, i, EdgeKind::Contains).unwrap();
            }
        }
        g
    }

    #[test]
    fn test_boost_table() {
        assert_eq!(boost_score(true, false, false), 0.3);
        assert_eq!(boost_score(false, true, false), 0.3);
        assert_eq!(boost_score(false, false, true), 0.4);
        assert!((boost_score(true, true, false) - 0.6).abs() < 1e-6);
        assert!((boost_score(true, false, true) - 0.7).abs() < 1e-6);
        assert!((boost_score(true, true, true) - 1.0).abs() < 1e-6);
        assert_eq!(boost_score(false, false, false), 0.0);
    }

    #[test]
    fn test_common_ingredient_normalized() {
        assert!(is_common_ingredient("  Soy Lecithin "));
        assert!(!is_common_ingredient("hazelnut"));
    }

    #[tokio::test]
    async fn test_shared_distinctive_ingredient_fires() {
        let g = graph(&[("A", &["Hazelnut", "sugar"]), ("B", &["hazelnut"])]);
        let anchor = Anchor::resolve(&chunk("A", "X", "Y"), &RecordStore::default(), &g).await.unwrap();
        let mut scorer = BoostScorer::new(&anchor, &g);
        let boost = scorer.score(&chunk("B", "Other", "Else")).await.unwrap();
        assert_eq!(boost, INGREDIENT_BOOST);
    }

    #[tokio::test]
    async fn test_only_common_ingredients_do_not_fire() {
        let g = graph(&[("A", &["sugar", "water"]), ("B", &["Sugar", "water"])]);
        let anchor = Anchor::resolve(&chunk("A", "X", "Y"), &RecordStore::default(), &g).await.unwrap();
        let mut scorer = BoostScorer::new(&anchor, &g);
        assert_eq!(scorer.score(&chunk("B", "Other", "Else")).await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn test_missing_graph_node_contributes_zero() {
        let g = graph(&[("A", &["hazelnut"])]);
        let anchor = Anchor::resolve(&chunk("A", "Aero", "Chocolate"), &RecordStore::default(), &g)
            .await
            .unwrap();
        let mut scorer = BoostScorer::new(&anchor, &g);
        let boost = scorer.score(&chunk("Ghost", "Aero", "Candy")).await.unwrap();
        assert_eq!(boost, BRAND_BOOST);
    }

    #[tokio::test]
    async fn test_equal_blank_brand_and_category_match() {
        let g = InMemoryGraph::new();
        let anchor = Anchor::resolve(&chunk("A", "", " "), &RecordStore::default(), &g).await.unwrap();
        let mut scorer = BoostScorer::new(&anchor, &g);
        let boost = scorer.score(&chunk("B", "", "")).await.unwrap();
        assert!((boost - 0.6).abs() < 1e-6);
        assert_eq!(scorer.score(&chunk("C", "Aero", "Chocolate")).await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn test_missing_field_never_matches() {
        let g = InMemoryGraph::new();
        let recipe: ChunkMetadata = serde_json::from_value(serde_json::json!({
            "source": "recipe",
            "chunk_type": "recipe_title",
            "recipe_title": "Mousse",
        }))
        .unwrap();
        let anchor = Anchor::resolve(&recipe, &RecordStore::default(), &g).await.unwrap();
        let mut scorer = BoostScorer::new(&anchor, &g);
        assert_eq!(scorer.score(&recipe).await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn test_anchor_prefers_structured_record() {
        let records = RecordStore::new(
            vec![ProductRecord {
                name: "A".to_string(),
                brand: "Aero".to_string(),
                category: String::new(),
                ..Default::default()
            }],
            Vec::new(),
        );
        let g = InMemoryGraph::new();
        let anchor = Anchor::resolve(&chunk("A", "Stale", "Chocolate"), &records, &g).await.unwrap();
        assert_eq!(anchor.brand.as_deref(), Some("Aero"));
        // the record's blank category wins over the chunk's copy
        assert_eq!(anchor.category.as_deref(), Some(""));
    }
}
