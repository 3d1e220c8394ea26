pub mod boost;
pub mod combined;
pub mod engine;
pub mod fusion;
pub mod lexical;

// Re-export key types for convenience
pub use boost::{Anchor, BoostScorer, COMMON_INGREDIENTS};
pub use combined::{classify_intent, CombinedHit, CombinedResults, QueryIntent};
pub use engine::{FusionStrategy, RetrievalContext, RetrievalEngine, RetrievalOptions};
pub use fusion::{RankedResult, ScoreBreakdown};
pub use lexical::{Bm25Scorer, LexicalCorpus};
