/// Structured record store
///
/// Holds the full product facts (and recipe details when available) that the
/// lighter chunk metadata leaves out. Used to resolve the fusion anchor and to
/// assemble context blocks. Lookups are keyed by normalized name; a miss is
/// `None`, never an error.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::errors::NestragError;
use crate::index::Source;

/// Full product facts as written by the product parser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub name: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub features_benefits: String,
    /// Comma-separated ingredient declaration
    #[serde(default)]
    pub ingredients: String,
    #[serde(default)]
    pub weight: Option<String>,
    #[serde(default)]
    pub url: String,
}

/// Recipe detail record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipeRecord {
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub skill_level: Option<String>,
    #[serde(default)]
    pub prep_time_mins: Option<u32>,
    #[serde(default)]
    pub cook_time_mins: Option<u32>,
    #[serde(default)]
    pub servings: Option<u32>,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub instructions: Vec<String>,
}

/// Either kind of record, as returned by a source-agnostic lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntityRecord<'a> {
    Product(&'a ProductRecord),
    Recipe(&'a RecipeRecord),
}

impl<'a> EntityRecord<'a> {
    /// Trimmed brand as recorded; a blank brand is `Some("")`. Recipes carry none.
    pub fn brand(&self) -> Option<&'a str> {
        match *self {
            EntityRecord::Product(p) => Some(p.brand.trim()),
            EntityRecord::Recipe(_) => None,
        }
    }

    pub fn category(&self) -> Option<&'a str> {
        match *self {
            EntityRecord::Product(p) => Some(p.category.trim()),
            EntityRecord::Recipe(_) => None,
        }
    }
}

/// Normalize an entity name for record lookup.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    products: Vec<ProductRecord>,
    recipes: Vec<RecipeRecord>,
    product_index: HashMap<String, usize>,
    recipe_index: HashMap<String, usize>,
}

impl RecordStore {
    /// Build the lookup tables. When two records normalize to the same key the first one wins.
    pub fn new(products: Vec<ProductRecord>, recipes: Vec<RecipeRecord>) -> Self {
        let mut product_index = HashMap::with_capacity(products.len());
        for (i, p) in products.iter().enumerate() {
            product_index.entry(normalize_name(&p.name)).or_insert(i);
        }
        let mut recipe_index = HashMap::with_capacity(recipes.len());
        for (i, r) in recipes.iter().enumerate() {
            recipe_index.entry(normalize_name(&r.title)).or_insert(i);
        }
        RecordStore {
            products,
            recipes,
            product_index,
            recipe_index,
        }
    }

    pub fn load(products_path: &Path, recipes_path: Option<&Path>) -> Result<Self, NestragError> {
        let products: Vec<ProductRecord> = read_json(products_path, "product records")?;
        let recipes: Vec<RecipeRecord> = match recipes_path {
            Some(path) => read_json(path, "recipe records")?,
            None => Vec::new(),
        };
        Ok(Self::new(products, recipes))
    }

    pub fn product(&self, name: &str) -> Option<&ProductRecord> {
        self.product_index
            .get(&normalize_name(name))
            .and_then(|&i| self.products.get(i))
    }

    pub fn recipe(&self, title: &str) -> Option<&RecipeRecord> {
        self.recipe_index
            .get(&normalize_name(title))
            .and_then(|&i| self.recipes.get(i))
    }

    pub fn get(&self, source: Source, name: &str) -> Option<EntityRecord<'_>> {
        match source {
            Source::Product => self.product(name).map(EntityRecord::Product),
            Source::Recipe => self.recipe(name).map(EntityRecord::Recipe),
        }
    }

    /// Look up by name alone, preferring products.
    pub fn find(&self, name: &str) -> Option<EntityRecord<'_>> {
        self.get(Source::Product, name)
            .or_else(|| self.get(Source::Recipe, name))
    }

    pub fn product_count(&self) -> usize {
        self.products.len()
    }

    pub fn recipe_count(&self) -> usize {
        self.recipes.len()
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> Result<T, NestragError> {
    let raw = std::fs::read_to_string(path).map_err(|e| NestragError::load(path, what, e))?;
    serde_json::from_str(&raw).map_err(|e| NestragError::load(path, what, e))
}
