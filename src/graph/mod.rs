/// Knowledge graph access
///
/// The retrieval engine only reads the product/recipe graph, and only through
/// the `GraphReader` capability trait. The four primitives (successors,
/// predecessors, existence, typed neighbours) plus a text-match lookup are
/// required; the traversal queries used by the CLI and combined retrieval are
/// provided on top of them, so every backend gets them for free.
///
/// `InMemoryGraph` is the bundled backend, loaded from the node-link JSON the
/// graph build job writes.

pub mod memory;

pub use memory::{GraphEdge, GraphFile, InMemoryGraph};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::errors::NestragError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Product,
    Brand,
    Category,
    Ingredient,
    Recipe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    /// Product → Brand
    #[serde(alias = "IS_BRAND")]
    BelongsTo,
    /// Product → Category
    #[serde(alias = "IS_TYPE")]
    InCategory,
    /// Product → Ingredient
    Contains,
    /// Product → Ingredient
    HasIngredient,
    /// Ingredient → Recipe
    UsedIn,
    /// Recipe → Ingredient
    UsesIngredient,
    /// Product → Recipe, fuzzy-matched from recipe ingredient lines
    MentionedInIngredient,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub name: String,
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl GraphNode {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        GraphNode {
            name: name.into(),
            kind,
            url: None,
            brand: None,
            description: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// Products and recipes touching one ingredient.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngredientConnections {
    pub ingredient: String,
    pub products: Vec<String>,
    pub recipes: Vec<String>,
}

/// Read-only capability over the product/recipe graph.
///
/// A missing node is never an error: neighbour queries return an empty list.
/// Errors are reserved for backend failures and are propagated to the caller.
#[async_trait]
pub trait GraphReader: Send + Sync {
    async fn successors(&self, name: &str) -> Result<Vec<GraphNode>, NestragError>;

    async fn predecessors(&self, name: &str) -> Result<Vec<GraphNode>, NestragError>;

    async fn node_exists(&self, name: &str) -> Result<bool, NestragError>;

    /// Neighbours of `name` in one direction, restricted to nodes of `kind`.
    async fn neighbors_with_type(
        &self,
        name: &str,
        kind: NodeKind,
        direction: Direction,
    ) -> Result<Vec<GraphNode>, NestragError>;

    /// Nodes of `kind` whose name or brand contains `needle` (case-insensitive).
    async fn search_nodes(&self, kind: NodeKind, needle: &str, limit: usize) -> Result<Vec<GraphNode>, NestragError>;

    /// Ingredient successors of a product or recipe.
    async fn ingredients_of(&self, name: &str) -> Result<Vec<String>, NestragError> {
        Ok(names(self.neighbors_with_type(name, NodeKind::Ingredient, Direction::Outgoing).await?))
    }

    async fn products_with_ingredient(&self, ingredient: &str) -> Result<Vec<String>, NestragError> {
        Ok(names(self.neighbors_with_type(ingredient, NodeKind::Product, Direction::Incoming).await?))
    }

    /// Other products sharing at least one ingredient with `product`, sorted by name.
    async fn similar_products(&self, product: &str) -> Result<Vec<String>, NestragError> {
        let mut related = std::collections::BTreeSet::new();
        for ingredient in self.ingredients_of(product).await? {
            for other in self.products_with_ingredient(&ingredient).await? {
                if other != product {
                    related.insert(other);
                }
            }
        }
        Ok(related.into_iter().collect())
    }

    /// Recipes linked by MENTIONED_IN_INGREDIENT from any product whose name contains `product`.
    async fn recipes_mentioning_product(&self, product: &str, limit: usize) -> Result<Vec<GraphNode>, NestragError> {
        let mut seen = HashSet::new();
        let mut recipes = Vec::new();
        for p in self.search_nodes(NodeKind::Product, product, usize::MAX).await? {
            if !p.name.to_lowercase().contains(&product.trim().to_lowercase()) {
                continue;
            }
            for r in self.neighbors_with_type(&p.name, NodeKind::Recipe, Direction::Outgoing).await? {
                if recipes.len() >= limit {
                    return Ok(recipes);
                }
                if seen.insert(r.name.clone()) {
                    recipes.push(r);
                }
            }
        }
        Ok(recipes)
    }

    /// Products that share an ingredient with a recipe, at most ten.
    async fn products_used_in_recipe(&self, recipe: &str) -> Result<Vec<GraphNode>, NestragError> {
        const LIMIT: usize = 10;
        let mut ingredients = self
            .neighbors_with_type(recipe, NodeKind::Ingredient, Direction::Outgoing)
            .await?;
        ingredients.extend(
            self.neighbors_with_type(recipe, NodeKind::Ingredient, Direction::Incoming)
                .await?,
        );

        let mut seen = HashSet::new();
        let mut products = Vec::new();
        for ingredient in ingredients {
            for p in self
                .neighbors_with_type(&ingredient.name, NodeKind::Product, Direction::Incoming)
                .await?
            {
                if seen.insert(p.name.clone()) {
                    products.push(p);
                    if products.len() == LIMIT {
                        return Ok(products);
                    }
                }
            }
        }
        Ok(products)
    }

    /// Products and recipes connected to an ingredient; None if no such ingredient node.
    async fn ingredient_connections(&self, ingredient: &str) -> Result<Option<IngredientConnections>, NestragError> {
        if !self.node_exists(ingredient).await? {
            return Ok(None);
        }
        let products = self.products_with_ingredient(ingredient).await?;
        let mut recipes = names(
            self.neighbors_with_type(ingredient, NodeKind::Recipe, Direction::Outgoing)
                .await?,
        );
        for r in names(
            self.neighbors_with_type(ingredient, NodeKind::Recipe, Direction::Incoming)
                .await?,
        ) {
            if !recipes.contains(&r) {
                recipes.push(r);
            }
        }
        Ok(Some(IngredientConnections {
            ingredient: ingredient.to_string(),
            products,
            recipes,
        }))
    }
}

fn names(nodes: Vec<GraphNode>) -> Vec<String> {
    nodes.into_iter().map(|n| n.name).collect()
}
