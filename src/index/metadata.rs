/// Chunk metadata: the position-aligned table that sits beside the vector index.
///
/// Entries are a tagged union over product and recipe chunks sharing a common
/// set of display fields. The on-disk form is the JSON array the index build job
/// writes: product entries carry `product_name`, recipe entries `recipe_title`.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use crate::errors::NestragError;

/// Semantic role of an indexed chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Overview,
    Features,
    Ingredients,
    NameReference,
    RecipeTitle,
    RecipeDescription,
    RecipeIngredients,
    RecipeInstructions,
    IngredientSummary,
}

/// Which record family a chunk (or graph hit) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Product,
    Recipe,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Product => write!(f, "product"),
            Source::Recipe => write!(f, "recipe"),
        }
    }
}

/// Identity of the product or recipe a chunk belongs to. Results are deduplicated on this.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    pub source: Source,
    pub name: String,
}

/// Display fields shared by every chunk, denormalized from the owning record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayFields {
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    /// The chunk text itself, when the build job stored it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductChunk {
    pub chunk_type: ChunkType,
    pub product_name: String,
    #[serde(flatten)]
    pub display: DisplayFields,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeChunk {
    pub chunk_type: ChunkType,
    pub recipe_title: String,
    #[serde(default)]
    pub prep_time_mins: Option<u32>,
    #[serde(default)]
    pub cook_time_mins: Option<u32>,
    #[serde(default)]
    pub servings: Option<u32>,
    #[serde(default)]
    pub skill_level: Option<String>,
    #[serde(flatten)]
    pub display: DisplayFields,
}

/// One metadata entry. Ordinal `i` in the vector index always refers to `metadata[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChunkMetadata {
    Product(ProductChunk),
    Recipe(RecipeChunk),
}

impl ChunkMetadata {
    pub fn source(&self) -> Source {
        match self {
            ChunkMetadata::Product(_) => Source::Product,
            ChunkMetadata::Recipe(_) => Source::Recipe,
        }
    }

    /// Product name or recipe title.
    pub fn entity_name(&self) -> &str {
        match self {
            ChunkMetadata::Product(p) => &p.product_name,
            ChunkMetadata::Recipe(r) => &r.recipe_title,
        }
    }

    pub fn entity_key(&self) -> EntityKey {
        EntityKey {
            source: self.source(),
            name: self.entity_name().to_string(),
        }
    }

    pub fn chunk_type(&self) -> ChunkType {
        match self {
            ChunkMetadata::Product(p) => p.chunk_type,
            ChunkMetadata::Recipe(r) => r.chunk_type,
        }
    }

    pub fn display(&self) -> &DisplayFields {
        match self {
            ChunkMetadata::Product(p) => &p.display,
            ChunkMetadata::Recipe(r) => &r.display,
        }
    }

    /// Brand, treating an empty string as absent.
    pub fn brand(&self) -> Option<&str> {
        non_empty(self.display().brand.as_deref())
    }

    /// Category, treating an empty string as absent.
    pub fn category(&self) -> Option<&str> {
        non_empty(self.display().category.as_deref())
    }

    /// Trimmed brand as stored. Unlike [`ChunkMetadata::brand`], a blank value
    /// is `Some("")`; only a missing field is `None`.
    pub fn brand_field(&self) -> Option<&str> {
        self.display().brand.as_deref().map(str::trim)
    }

    pub fn category_field(&self) -> Option<&str> {
        self.display().category.as_deref().map(str::trim)
    }

    pub fn url(&self) -> Option<&str> {
        non_empty(self.display().url.as_deref())
    }

    pub fn text(&self) -> Option<&str> {
        non_empty(self.display().text.as_deref())
    }
}

pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Load the metadata table written by the index build job.
///
/// Chunks that carry their text are checked for the build-time uniqueness
/// invariant; violations are logged, not rejected.
pub fn load_metadata(path: &Path) -> Result<Vec<ChunkMetadata>, NestragError> {
    let raw = std::fs::read_to_string(path).map_err(|e| NestragError::load(path, "metadata", e))?;
    let entries: Vec<ChunkMetadata> =
        serde_json::from_str(&raw).map_err(|e| NestragError::load(path, "metadata", e))?;

    let duplicates = count_duplicate_texts(&entries);
    if duplicates > 0 {
        tracing::warn!(
            path = %path.display(),
            duplicates,
            "Metadata contains repeated chunk text; index may over-represent repeated phrasing"
        );
    }

    Ok(entries)
}

/// Number of entries whose text repeats an earlier entry (case-insensitive).
pub fn count_duplicate_texts(entries: &[ChunkMetadata]) -> usize {
    let mut seen = HashSet::new();
    entries
        .iter()
        .filter_map(ChunkMetadata::text)
        .filter(|text| !seen.insert(text.to_lowercase()))
        .count()
}
