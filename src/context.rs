/// Context assembly for the answer-generation step
///
/// Turns ranked results (or a single named entity) into plain-text blocks a
/// language model can read. Output is bounded by `max_chars`: whole blocks are
/// dropped from the end, and only a lone first block is ever cut mid-way.

use std::fmt::Write;

use crate::index::ChunkMetadata;
use crate::search::RankedResult;
use crate::store::{EntityRecord, ProductRecord, RecipeRecord, RecordStore};

const NOT_AVAILABLE: &str = "N/A";

pub struct ContextAssembler<'a> {
    records: &'a RecordStore,
    max_chars: usize,
}

impl<'a> ContextAssembler<'a> {
    pub fn new(records: &'a RecordStore, max_chars: usize) -> Self {
        ContextAssembler { records, max_chars }
    }

    /// Full summary of one product or recipe. `None` if the name is unknown.
    pub fn assemble_context(&self, entity_name: &str) -> Option<String> {
        let block = match self.records.find(entity_name)? {
            EntityRecord::Product(p) => product_summary(p),
            EntityRecord::Recipe(r) => recipe_summary(r),
        };
        Some(truncate_chars(&block, self.max_chars).to_string())
    }

    /// Numbered blocks for ranked results, joined by blank lines.
    pub fn build_context(&self, results: &[RankedResult]) -> String {
        let blocks: Vec<String> = results
            .iter()
            .enumerate()
            .map(|(i, r)| self.result_block(i + 1, &r.metadata))
            .collect();
        bounded_join(&blocks, "\n", self.max_chars)
    }

    fn result_block(&self, position: usize, meta: &ChunkMetadata) -> String {
        let mut out = String::new();
        match meta {
            ChunkMetadata::Product(chunk) => {
                let record = self.records.product(&chunk.product_name);
                let features = record.map(|p| p.features_benefits.trim()).unwrap_or_default();
                let ingredients = record.map(|p| p.ingredients.trim()).unwrap_or_default();
                let _ = writeln!(out, "Product #{}:", position);
                let _ = writeln!(out, "Name: {}", chunk.product_name);
                let _ = writeln!(out, "Brand: {}", meta.brand().unwrap_or(NOT_AVAILABLE));
                let _ = writeln!(out, "Category: {}", meta.category().unwrap_or(NOT_AVAILABLE));
                let _ = writeln!(out, "Features: {}", or_na(features));
                let _ = writeln!(out, "Ingredients: {}", or_na(ingredients));
            }
            ChunkMetadata::Recipe(chunk) => {
                let record = self.records.recipe(&chunk.recipe_title);
                let ingredients = record.map(|r| r.ingredients.join("; ")).unwrap_or_default();
                let skill = chunk
                    .skill_level
                    .as_deref()
                    .or_else(|| record.and_then(|r| r.skill_level.as_deref()));
                let _ = writeln!(out, "Recipe #{}:", position);
                let _ = writeln!(out, "Title: {}", chunk.recipe_title);
                let _ = writeln!(out, "Skill level: {}", skill.unwrap_or(NOT_AVAILABLE));
                let _ = writeln!(out, "Prep time: {}", minutes(chunk.prep_time_mins));
                let _ = writeln!(out, "Cook time: {}", minutes(chunk.cook_time_mins));
                let _ = writeln!(out, "Ingredients: {}", or_na(&ingredients));
            }
        }
        let _ = writeln!(out, "URL: {}", meta.url().unwrap_or(NOT_AVAILABLE));
        out
    }
}

fn product_summary(p: &ProductRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Product: {}", p.name);
    let _ = writeln!(out, "Brand: {}", or_na(p.brand.trim()));
    let _ = writeln!(out, "Category: {}\n", or_na(p.category.trim()));
    let _ = writeln!(out, "Description:\n{}\n", p.description.trim());
    let _ = writeln!(out, "Features:\n{}\n", p.features_benefits.trim());
    let _ = writeln!(out, "Ingredients:\n{}", p.ingredients.trim());
    if let Some(weight) = p.weight.as_deref().filter(|w| !w.trim().is_empty()) {
        let _ = writeln!(out, "\nWeight: {}", weight.trim());
    }
    out
}

fn recipe_summary(r: &RecipeRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Recipe: {}", r.title);
    let _ = writeln!(out, "Skill level: {}", r.skill_level.as_deref().unwrap_or(NOT_AVAILABLE));
    let _ = writeln!(out, "Prep time: {}", minutes(r.prep_time_mins));
    let _ = writeln!(out, "Cook time: {}", minutes(r.cook_time_mins));
    let servings = r.servings.map(|s| s.to_string());
    let _ = writeln!(out, "Servings: {}\n", servings.as_deref().unwrap_or(NOT_AVAILABLE));
    if !r.description.trim().is_empty() {
        let _ = writeln!(out, "Description:\n{}\n", r.description.trim());
    }
    let _ = writeln!(out, "Ingredients:");
    for line in &r.ingredients {
        let _ = writeln!(out, "- {}", line);
    }
    let _ = writeln!(out, "\nInstructions:");
    for (i, step) in r.instructions.iter().enumerate() {
        let _ = writeln!(out, "{}. {}", i + 1, step);
    }
    out
}

fn or_na(value: &str) -> &str {
    if value.is_empty() {
        NOT_AVAILABLE
    } else {
        value
    }
}

fn minutes(value: Option<u32>) -> String {
    value.map_or_else(|| NOT_AVAILABLE.to_string(), |m| format!("{} min", m))
}

/// Join whole blocks while the total stays within `max_chars`.
/// The first block is always present, cut on a char boundary if it alone is too long.
fn bounded_join(blocks: &[String], separator: &str, max_chars: usize) -> String {
    let mut out = String::new();
    let mut used = 0;
    for (i, block) in blocks.iter().enumerate() {
        let len = block.chars().count();
        if i == 0 {
            let first = truncate_chars(block, max_chars);
            used = first.chars().count();
            out.push_str(first);
            continue;
        }
        let extra = separator.chars().count() + len;
        if used + extra > max_chars {
            break;
        }
        out.push_str(separator);
        out.push_str(block);
        used += extra;
    }
    out
}

fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::ScoreBreakdown;

    fn store() -> RecordStore {
        RecordStore::new(
            vec![ProductRecord {
                name: "AERO Bar".to_string(),
                brand: "Aero".to_string(),
                category: "Chocolate".to_string(),
                description: "Bubbly".to_string(),
                features_benefits: "Melts in your mouth".to_string(),
                ingredients: "cocoa, sugar, hazelnut".to_string(),
                ..Default::default()
            }],
            vec![RecipeRecord {
                title: "Toll House Cookies".to_string(),
                skill_level: Some("Easy".to_string()),
                prep_time_mins: Some(15),
                servings: Some(60),
                ingredients: vec!["2 cups flour".to_string(), "1 cup morsels".to_string()],
                instructions: vec!["Preheat oven.".to_string(), "Bake.".to_string()],
                ..Default::default()
            }],
        )
    }

    fn result(json: serde_json::Value) -> RankedResult {
        RankedResult {
            score: 0.5,
            metadata: serde_json::from_value(json).unwrap(),
            breakdown: ScoreBreakdown::default(),
        }
    }

    #[test]
    fn test_assemble_product_context() {
        let store = store();
        let text = ContextAssembler::new(&store, 6000).assemble_context("aero bar").unwrap();
        assert!(text.starts_with("Product: AERO Bar\nBrand: Aero\nCategory: Chocolate"));
        assert!(text.contains("Features:\nMelts in your mouth"));
        assert!(text.contains("Ingredients:\ncocoa, sugar, hazelnut"));
    }

    #[test]
    fn test_assemble_recipe_context() {
        let store = store();
        let text = ContextAssembler::new(&store, 6000)
            .assemble_context("Toll House Cookies")
            .unwrap();
        assert!(text.contains("Servings: 60"));
        assert!(text.contains("Cook time: N/A"));
        assert!(text.contains("- 2 cups flour"));
        assert!(text.contains("2. Bake."));
    }

    #[test]
    fn test_unknown_entity_is_none() {
        let store = store();
        assert!(ContextAssembler::new(&store, 6000).assemble_context("Smarties").is_none());
    }

    #[test]
    fn test_build_context_blocks() {
        let store = store();
        let results = vec![
            result(serde_json::json!({"chunk_type": "overview", "product_name": "AERO Bar",
                "brand": "Aero", "category": "Chocolate", "url": "https://example.test/aero"})),
            result(serde_json::json!({"chunk_type": "overview", "product_name": "Unknown Bar"})),
        ];
        let text = ContextAssembler::new(&store, 6000).build_context(&results);
        assert!(text.starts_with("Product #1:\nName: AERO Bar\nBrand: Aero"));
        assert!(text.contains("Features: Melts in your mouth"));
        assert!(text.contains("Product #2:\nName: Unknown Bar\nBrand: N/A"));
        assert!(text.contains("Ingredients: N/A"));
    }

    #[test]
    fn test_build_context_respects_bound() {
        let store = store();
        let results: Vec<RankedResult> = (0..5)
            .map(|i| result(serde_json::json!({"chunk_type": "overview", "product_name": format!("Bar {}", i)})))
            .collect();
        let full = ContextAssembler::new(&store, usize::MAX).build_context(&results);
        let first_len = full.split("\nProduct #2").next().unwrap().chars().count();

        let bounded = ContextAssembler::new(&store, first_len + 10).build_context(&results);
        assert!(bounded.chars().count() <= first_len + 10);
        assert!(!bounded.contains("Product #2"));

        let tiny = ContextAssembler::new(&store, 7).build_context(&results);
        assert_eq!(tiny, "Product");
    }

    #[test]
    fn test_truncate_chars_multibyte() {
        assert_eq!(truncate_chars("Nestlé", 6), "Nestlé");
        assert_eq!(truncate_chars("Nestlé", 5), "Nestl");
    }
}
