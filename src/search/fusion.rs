/// Score normalization, fusion and entity deduplication
///
/// Fusion is a fixed-weight linear blend of independently min-max normalized
/// signals. The default blend is 60% semantic similarity and 40% graph boost;
/// the lexical-hybrid alternative blends 60% BM25 with 40% semantic rank.
///
/// All functions here are pure. Every fused score stays inside [0, 1].

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashSet;

use crate::index::ChunkMetadata;

pub const SEMANTIC_WEIGHT: f32 = 0.6;
pub const BOOST_WEIGHT: f32 = 0.4;

pub const HYBRID_LEXICAL_WEIGHT: f32 = 0.6;
pub const HYBRID_SEMANTIC_WEIGHT: f32 = 0.4;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Per-signal contributions behind a fused score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub semantic: f32,
    pub boost: f32,
    pub lexical: f32,
}

/// One scored chunk before deduplication.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Position in the semantic candidate list (0 = nearest)
    pub rank: usize,
    pub metadata: ChunkMetadata,
    pub score: f32,
    pub breakdown: ScoreBreakdown,
}

/// A deduplicated result returned to callers.
#[derive(Debug, Clone, Serialize)]
pub struct RankedResult {
    pub score: f32,
    pub metadata: ChunkMetadata,
    pub breakdown: ScoreBreakdown,
}

// ---------------------------------------------------------------------------
// Pure scoring functions
// ---------------------------------------------------------------------------

/// Min-max normalization over a slice of values.
///
/// If max == min (including single-element slices) every value maps to 0.0,
/// so a signal that cannot tell candidates apart contributes nothing.
/// Non-finite inputs map to 0.0.
pub fn normalize(values: &[f32]) -> Vec<f32> {
    let finite = values.iter().copied().filter(|v| v.is_finite());
    let (min, max) = finite.fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !min.is_finite() || (max - min).abs() < f32::EPSILON {
        return vec![0.0; values.len()];
    }
    values
        .iter()
        .map(|&v| if v.is_finite() { ((v - min) / (max - min)).clamp(0.0, 1.0) } else { 0.0 })
        .collect()
}

/// Distances to [0, 1] similarities: the nearest candidate maps to 1.0.
pub fn distance_similarities(distances: &[f32]) -> Vec<f32> {
    let negated: Vec<f32> = distances.iter().map(|d| -d).collect();
    normalize(&negated)
}

pub fn graph_boost_fusion(semantic: f32, boost: f32) -> f32 {
    (SEMANTIC_WEIGHT * semantic + BOOST_WEIGHT * boost).clamp(0.0, 1.0)
}

pub fn lexical_hybrid_fusion(lexical: f32, semantic: f32) -> f32 {
    (HYBRID_LEXICAL_WEIGHT * lexical + HYBRID_SEMANTIC_WEIGHT * semantic).clamp(0.0, 1.0)
}

/// Rank position to a decreasing score: 1.0 for rank 0, 0.5 for rank 1, ...
pub fn reciprocal_rank(rank: usize) -> f32 {
    1.0 / (1.0 + rank as f32)
}

// ---------------------------------------------------------------------------
// Ranking
// ---------------------------------------------------------------------------

/// Sort by fused score descending; equal scores keep semantic rank order.
pub fn sort_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.rank.cmp(&b.rank))
    });
}

/// Keep the first occurrence of each entity until `top_n` are collected.
/// Later chunks of an already-kept entity are dropped, not merged.
pub fn dedupe_top_n(candidates: Vec<Candidate>, top_n: usize) -> Vec<RankedResult> {
    let mut seen = HashSet::new();
    let mut results = Vec::with_capacity(top_n);
    for c in candidates {
        if results.len() >= top_n {
            break;
        }
        if seen.insert(c.metadata.entity_key()) {
            results.push(RankedResult {
                score: c.score,
                metadata: c.metadata,
                breakdown: c.breakdown,
            });
        }
    }
    results
}

/// Number of distinct entities in a metadata slice.
pub fn distinct_entities<'a>(entries: impl IntoIterator<Item = &'a ChunkMetadata>) -> usize {
    entries
        .into_iter()
        .map(ChunkMetadata::entity_key)
        .collect::<HashSet<_>>()
        .len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(name: &str) -> ChunkMetadata {
        serde_json::from_value(serde_json::json!({"chunk_type": "overview", "product_name": name})).unwrap()
    }

    fn candidate(rank: usize, name: &str, score: f32, lexical: f32) -> Candidate {
        Candidate {
            rank,
            metadata: chunk(name),
            score,
            breakdown: ScoreBreakdown {
                lexical,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_normalize_basic() {
        let result = normalize(&[0.0, 0.5, 1.0]);
        assert!((result[0] - 0.0).abs() < 1e-6);
        assert!((result[1] - 0.5).abs() < 1e-6);
        assert!((result[2] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_all_equal_is_zero() {
        assert_eq!(normalize(&[3.0, 3.0]), vec![0.0, 0.0]);
        assert_eq!(normalize(&[7.0]), vec![0.0]);
        assert_eq!(normalize(&[0.0, f32::NAN, 0.0]), vec![0.0, 0.0, 0.0]);
        assert!(normalize(&[]).is_empty());
    }

    #[test]
    fn test_normalize_non_finite_is_zero() {
        let result = normalize(&[f32::NAN, 1.0, 2.0]);
        assert_eq!(result, vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_distance_similarities_invert() {
        let sims = distance_similarities(&[0.1, 0.6, 1.1]);
        assert!((sims[0] - 1.0).abs() < 1e-6);
        assert!((sims[1] - 0.5).abs() < 1e-6);
        assert!(sims[2].abs() < 1e-6);
    }

    #[test]
    fn test_fusion_bounds() {
        assert!((graph_boost_fusion(1.0, 1.0) - 1.0).abs() < 1e-6);
        assert_eq!(graph_boost_fusion(0.0, 0.0), 0.0);
        assert!((graph_boost_fusion(0.5, 0.3) - 0.42).abs() < 1e-6);
        assert!((lexical_hybrid_fusion(1.0, 0.0) - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_reciprocal_rank() {
        assert_eq!(reciprocal_rank(0), 1.0);
        assert_eq!(reciprocal_rank(1), 0.5);
    }

    #[test]
    fn test_sort_ties_keep_semantic_rank() {
        let mut cs = vec![
            candidate(3, "D", 0.5, 0.0),
            candidate(1, "B", 0.5, 2.0),
            candidate(2, "C", 0.9, 0.0),
            candidate(0, "A", 0.5, 0.0),
        ];
        sort_candidates(&mut cs);
        let order: Vec<&str> = cs.iter().map(|c| c.metadata.entity_name()).collect();
        // a higher lexical score does not reorder a score tie
        assert_eq!(order, vec!["C", "A", "B", "D"]);
    }

    #[test]
    fn test_single_candidate_gets_no_semantic_credit() {
        assert_eq!(distance_similarities(&[0.42]), vec![0.0]);
    }

    #[test]
    fn test_dedupe_keeps_first_occurrence() {
        let cs = vec![
            candidate(0, "A", 0.9, 0.0),
            candidate(1, "A", 0.8, 0.0),
            candidate(2, "B", 0.7, 0.0),
            candidate(3, "C", 0.6, 0.0),
            candidate(4, "D", 0.5, 0.0),
        ];
        let results = dedupe_top_n(cs, 3);
        let names: Vec<&str> = results.iter().map(|r| r.metadata.entity_name()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
        assert!((results[0].score - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_dedupe_returns_fewer_when_exhausted() {
        let cs = vec![candidate(0, "A", 0.9, 0.0), candidate(1, "A", 0.8, 0.0)];
        assert_eq!(dedupe_top_n(cs, 3).len(), 1);
        assert!(dedupe_top_n(Vec::new(), 3).is_empty());
    }

    #[test]
    fn test_distinct_entities() {
        let entries = vec![chunk("A"), chunk("A"), chunk("B")];
        assert_eq!(distinct_entities(&entries), 2);
    }
}
