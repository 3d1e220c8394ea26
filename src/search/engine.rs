/// Hybrid retrieval engine
///
/// A request runs two independent passes over the shared read-only context:
///   1. Semantic: embed the query, then exact nearest-neighbour search over an
///      over-fetched candidate pool.
///   2. Lexical: BM25 over the whole metadata table.
/// Both complete before fusion. The configured strategy then scores every
/// semantic candidate, sorts, and keeps the first chunk per entity.
///
/// `RetrievalContext` is loaded once and never mutated, so any number of
/// requests can share it through an `Arc`.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, RetrievalConfig};
use crate::embedding::EmbeddingProvider;
use crate::errors::NestragError;
use crate::graph::{GraphReader, InMemoryGraph};
use crate::index::{ChunkMetadata, CorpusIndex, Neighbor};
use crate::store::RecordStore;

use super::boost::{Anchor, BoostScorer};
use super::fusion::{
    distance_similarities, distinct_entities, dedupe_top_n, graph_boost_fusion, lexical_hybrid_fusion, normalize,
    reciprocal_rank, sort_candidates, Candidate, RankedResult, ScoreBreakdown,
};
use super::lexical::{Bm25Scorer, LexicalCorpus};

/// How candidate scores are fused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FusionStrategy {
    /// 0.6 × semantic + 0.4 × graph boost
    #[default]
    GraphBoost,
    /// 0.6 × BM25 + 0.4 × semantic rank
    LexicalHybrid,
}

impl FromStr for FusionStrategy {
    type Err = NestragError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "graph_boost" => Ok(FusionStrategy::GraphBoost),
            "lexical_hybrid" => Ok(FusionStrategy::LexicalHybrid),
            other => Err(NestragError::validation(
                "strategy",
                &format!("Unknown fusion strategy '{}': expected 'graph_boost' or 'lexical_hybrid'", other),
            )),
        }
    }
}

impl fmt::Display for FusionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FusionStrategy::GraphBoost => write!(f, "graph_boost"),
            FusionStrategy::LexicalHybrid => write!(f, "lexical_hybrid"),
        }
    }
}

/// Per-engine retrieval knobs, validated from `RetrievalConfig`.
#[derive(Debug, Clone)]
pub struct RetrievalOptions {
    pub candidate_pool: usize,
    pub strategy: FusionStrategy,
    pub widen_pool: bool,
    pub request_timeout: Option<Duration>,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        RetrievalOptions {
            candidate_pool: 50,
            strategy: FusionStrategy::GraphBoost,
            widen_pool: true,
            request_timeout: None,
        }
    }
}

impl RetrievalOptions {
    pub fn from_config(config: &RetrievalConfig) -> Result<Self, NestragError> {
        Ok(RetrievalOptions {
            candidate_pool: config.candidate_pool,
            strategy: config.strategy.parse()?,
            widen_pool: config.widen_pool,
            request_timeout: config.request_timeout_ms.map(Duration::from_millis),
        })
    }
}

/// Immutable inputs shared by every request.
pub struct RetrievalContext {
    index: CorpusIndex,
    records: RecordStore,
    graph: Arc<dyn GraphReader>,
    lexical: Bm25Scorer,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl RetrievalContext {
    /// Assemble a context, checking the embedder against the index it will query.
    pub fn new(
        index: CorpusIndex,
        records: RecordStore,
        graph: Arc<dyn GraphReader>,
        embedder: Arc<dyn EmbeddingProvider>,
        corpus: LexicalCorpus,
    ) -> Result<Self, NestragError> {
        if embedder.model_name() != index.model() {
            return Err(NestragError::Config(format!(
                "Vector index was built with model '{}' but the embedding provider is '{}'",
                index.model(),
                embedder.model_name()
            )));
        }
        if embedder.dimension() != index.dimension() {
            return Err(NestragError::DimensionMismatch {
                expected: index.dimension(),
                actual: embedder.dimension(),
            });
        }

        let lexical = Bm25Scorer::from_metadata(index.metadata(), corpus);
        Ok(RetrievalContext {
            index,
            records,
            graph,
            lexical,
            embedder,
        })
    }

    /// Load every data file named in the config. Any failure is fatal.
    pub fn load(config: &Config, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self, NestragError> {
        let data = &config.data;
        let index = CorpusIndex::load(&data.index_path, &data.metadata_path, embedder.model_name())?;
        let records = RecordStore::load(&data.products_path, data.recipes_path.as_deref())?;
        let graph = InMemoryGraph::load(&data.graph_path)?;
        let corpus: LexicalCorpus = config.retrieval.lexical_corpus.parse()?;

        tracing::info!(
            chunks = index.len(),
            model = %index.model(),
            products = records.product_count(),
            recipes = records.recipe_count(),
            graph_nodes = graph.node_count(),
            graph_edges = graph.edge_count(),
            "Retrieval context loaded"
        );

        Self::new(index, records, Arc::new(graph), embedder, corpus)
    }

    pub fn index(&self) -> &CorpusIndex {
        &self.index
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    pub fn graph(&self) -> &dyn GraphReader {
        self.graph.as_ref()
    }

    pub fn embedder(&self) -> &dyn EmbeddingProvider {
        self.embedder.as_ref()
    }

    fn chunk(&self, ordinal: usize) -> Result<&ChunkMetadata, NestragError> {
        self.index.get(ordinal).ok_or(NestragError::InconsistentIndex {
            vectors: ordinal + 1,
            metadata: self.index.len(),
        })
    }
}

#[derive(Clone)]
pub struct RetrievalEngine {
    ctx: Arc<RetrievalContext>,
    options: RetrievalOptions,
}

impl RetrievalEngine {
    pub fn new(ctx: Arc<RetrievalContext>, options: RetrievalOptions) -> Self {
        RetrievalEngine { ctx, options }
    }

    pub fn context(&self) -> &RetrievalContext {
        &self.ctx
    }

    pub fn options(&self) -> &RetrievalOptions {
        &self.options
    }

    /// Top `top_n` distinct products or recipes for `query`, best first.
    ///
    /// A blank query, an empty index, or `top_n == 0` yields an empty list.
    pub async fn retrieve(&self, query: &str, top_n: usize) -> Result<Vec<RankedResult>, NestragError> {
        let query = query.trim();
        if query.is_empty() || top_n == 0 || self.ctx.index.is_empty() {
            return Ok(Vec::new());
        }
        self.with_deadline(self.rank(query, top_n)).await
    }

    /// Apply the configured per-request deadline, if any.
    pub(crate) async fn with_deadline<T>(
        &self,
        fut: impl Future<Output = Result<T, NestragError>>,
    ) -> Result<T, NestragError> {
        match self.options.request_timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
                tracing::warn!(timeout_ms = limit.as_millis() as u64, "Retrieval request timed out");
                NestragError::Timeout(limit.as_millis() as u64)
            })?,
            None => fut.await,
        }
    }

    async fn rank(&self, query: &str, top_n: usize) -> Result<Vec<RankedResult>, NestragError> {
        let (semantic, lexical) = tokio::join!(self.semantic_pass(query, top_n), self.lexical_pass(query));
        let hits = semantic?;
        let lexical = lexical?;

        tracing::debug!(
            strategy = %self.options.strategy,
            candidates = hits.len(),
            "Fusing retrieval passes"
        );

        let results = match self.options.strategy {
            FusionStrategy::GraphBoost => self.fuse_graph_boost(&hits, &lexical, top_n).await?,
            FusionStrategy::LexicalHybrid => self.fuse_lexical_hybrid(&hits, &lexical, top_n)?,
        };

        tracing::debug!(results = results.len(), top_n, "Retrieval complete");
        Ok(results)
    }

    /// Embed and search, growing the pool until it holds `top_n` distinct entities.
    async fn semantic_pass(&self, query: &str, top_n: usize) -> Result<Vec<Neighbor>, NestragError> {
        let vector = self.ctx.embedder.embed(query).await?;
        let total = self.ctx.index.len();

        let mut k = match self.options.strategy {
            FusionStrategy::GraphBoost => self.options.candidate_pool.min(total),
            // every entry needs a semantic rank
            FusionStrategy::LexicalHybrid => total,
        };
        if k == 0 {
            return Ok(Vec::new());
        }

        loop {
            let hits = self.ctx.index.search(&vector, k)?;
            let distinct = distinct_entities(hits.iter().map(|(_, meta)| *meta));
            if distinct >= top_n || k >= total || !self.options.widen_pool {
                tracing::debug!(pool = k, distinct, "Semantic pass complete");
                return Ok(hits.into_iter().map(|(hit, _)| hit).collect());
            }
            let next = (k * 2).min(total);
            tracing::debug!(pool = k, next, distinct, top_n, "Widening candidate pool");
            k = next;
        }
    }

    async fn lexical_pass(&self, query: &str) -> Result<Vec<f32>, NestragError> {
        let ctx = Arc::clone(&self.ctx);
        let query = query.to_string();
        tokio::task::spawn_blocking(move || ctx.lexical.scores(&query))
            .await
            .map_err(|e| NestragError::Internal(format!("Lexical scoring task failed: {}", e)))
    }

    async fn fuse_graph_boost(
        &self,
        hits: &[Neighbor],
        lexical: &[f32],
        top_n: usize,
    ) -> Result<Vec<RankedResult>, NestragError> {
        let Some(best) = hits.first() else {
            return Ok(Vec::new());
        };

        let anchor = Anchor::resolve(self.ctx.chunk(best.ordinal)?, &self.ctx.records, self.ctx.graph()).await?;
        tracing::debug!(
            anchor = %anchor.key.name,
            source = %anchor.key.source,
            brand = ?anchor.brand,
            category = ?anchor.category,
            ingredients = anchor.ingredients.len(),
            "Resolved fusion anchor"
        );

        let distances: Vec<f32> = hits.iter().map(|h| h.distance).collect();
        let semantic = distance_similarities(&distances);
        let mut scorer = BoostScorer::new(&anchor, self.ctx.graph());

        let mut candidates = Vec::with_capacity(hits.len());
        for (rank, (hit, &sem)) in hits.iter().zip(&semantic).enumerate() {
            let meta = self.ctx.chunk(hit.ordinal)?;
            let boost = scorer.score(meta).await?;
            candidates.push(Candidate {
                rank,
                metadata: meta.clone(),
                score: graph_boost_fusion(sem, boost),
                breakdown: ScoreBreakdown {
                    semantic: sem,
                    boost,
                    lexical: lexical.get(hit.ordinal).copied().unwrap_or(0.0),
                },
            });
        }

        sort_candidates(&mut candidates);
        Ok(dedupe_top_n(candidates, top_n))
    }

    fn fuse_lexical_hybrid(
        &self,
        hits: &[Neighbor],
        lexical: &[f32],
        top_n: usize,
    ) -> Result<Vec<RankedResult>, NestragError> {
        let lexical_norm = normalize(lexical);
        let rank_scores: Vec<f32> = (0..hits.len()).map(reciprocal_rank).collect();
        let semantic = normalize(&rank_scores);

        let mut candidates = Vec::with_capacity(hits.len());
        for (rank, (hit, &sem)) in hits.iter().zip(&semantic).enumerate() {
            let meta = self.ctx.chunk(hit.ordinal)?;
            let lex = lexical_norm.get(hit.ordinal).copied().unwrap_or(0.0);
            candidates.push(Candidate {
                rank,
                metadata: meta.clone(),
                score: lexical_hybrid_fusion(lex, sem),
                breakdown: ScoreBreakdown {
                    semantic: sem,
                    boost: 0.0,
                    lexical: lexical.get(hit.ordinal).copied().unwrap_or(0.0),
                },
            });
        }

        sort_candidates(&mut candidates);
        Ok(dedupe_top_n(candidates, top_n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingError;
    use crate::search::fusion::HYBRID_SEMANTIC_WEIGHT;
    use crate::index::VectorIndex;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Returns a fixed vector per query; unknown queries embed to the origin.
    struct FixtureEmbedder {
        dim: usize,
        vectors: HashMap<String, Vec<f32>>,
        delay: Option<Duration>,
        fail: bool,
    }

    impl FixtureEmbedder {
        fn new(dim: usize, vectors: &[(&str, Vec<f32>)]) -> Self {
            FixtureEmbedder {
                dim,
                vectors: vectors.iter().map(|(q, v)| (q.to_string(), v.clone())).collect(),
                delay: None,
                fail: false,
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for FixtureEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            if let Some(d) = self.delay {
                tokio::time::sleep(d).await;
            }
            if self.fail {
                return Err(EmbeddingError::Api {
                    status: 503,
                    message: "unavailable".to_string(),
                });
            }
            Ok(self.vectors.get(text).cloned().unwrap_or_else(|| vec![0.0; self.dim]))
        }

        fn model_name(&self) -> &str {
            "fixture"
        }

        fn dimension(&self) -> usize {
            self.dim
        }
    }

    fn product(name: &str, brand: &str) -> ChunkMetadata {
        serde_json::from_value(serde_json::json!({
            "chunk_type": "overview",
            "product_name": name,
            "brand": brand,
            "category": "Chocolate",
        }))
        .unwrap()
    }

    fn engine(rows: Vec<(ChunkMetadata, f32)>, embedder: FixtureEmbedder, options: RetrievalOptions) -> RetrievalEngine {
        let (metadata, vectors): (Vec<_>, Vec<_>) = rows.into_iter().map(|(m, x)| (m, vec![x])).unzip();
        let index = CorpusIndex::new(VectorIndex::new("fixture", 1, vectors).unwrap(), metadata).unwrap();
        let ctx = RetrievalContext::new(
            index,
            RecordStore::default(),
            Arc::new(InMemoryGraph::new()),
            Arc::new(embedder),
            LexicalCorpus::Identity,
        )
        .unwrap();
        RetrievalEngine::new(Arc::new(ctx), options)
    }

    /// Six chunks of one product nearest the query, three other products further out.
    fn crowded_rows() -> Vec<(ChunkMetadata, f32)> {
        let mut rows: Vec<_> = (0..6).map(|i| (product("A", "Aero"), i as f32 * 0.1)).collect();
        rows.push((product("B", "Kit Kat"), 1.0));
        rows.push((product("C", "Smarties"), 2.0));
        rows.push((product("D", "Rolo"), 3.0));
        rows
    }

    fn names(results: &[RankedResult]) -> Vec<&str> {
        results.iter().map(|r| r.metadata.entity_name()).collect()
    }

    #[tokio::test]
    async fn test_blank_query_and_zero_top_n_are_empty() {
        let e = engine(crowded_rows(), FixtureEmbedder::new(1, &[]), RetrievalOptions::default());
        assert!(e.retrieve("", 3).await.unwrap().is_empty());
        assert!(e.retrieve("   ", 3).await.unwrap().is_empty());
        assert!(e.retrieve("aero", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_index_is_empty() {
        let e = engine(Vec::new(), FixtureEmbedder::new(1, &[]), RetrievalOptions::default());
        assert!(e.retrieve("aero", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_widening_surfaces_distinct_entities() {
        let options = RetrievalOptions {
            candidate_pool: 4,
            ..Default::default()
        };
        let e = engine(crowded_rows(), FixtureEmbedder::new(1, &[("q", vec![0.0])]), options);
        let results = e.retrieve("q", 3).await.unwrap();
        assert_eq!(names(&results), vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_without_widening_small_pool_collapses() {
        let options = RetrievalOptions {
            candidate_pool: 4,
            widen_pool: false,
            ..Default::default()
        };
        let e = engine(crowded_rows(), FixtureEmbedder::new(1, &[("q", vec![0.0])]), options);
        assert_eq!(names(&e.retrieve("q", 3).await.unwrap()), vec!["A"]);
    }

    #[tokio::test]
    async fn test_fewer_entities_than_top_n() {
        let rows = vec![(product("A", "Aero"), 0.0), (product("A", "Aero"), 1.0)];
        let e = engine(rows, FixtureEmbedder::new(1, &[("q", vec![0.0])]), RetrievalOptions::default());
        assert_eq!(e.retrieve("q", 3).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_scores_bounded_and_deterministic() {
        let e = engine(crowded_rows(), FixtureEmbedder::new(1, &[("q", vec![1.5])]), RetrievalOptions::default());
        let first = e.retrieve("q", 4).await.unwrap();
        let second = e.retrieve("q", 4).await.unwrap();
        assert_eq!(names(&first), names(&second));
        for r in &first {
            assert!((0.0..=1.0).contains(&r.score), "score {} out of bounds", r.score);
        }
    }

    #[tokio::test]
    async fn test_lexical_hybrid_prefers_exact_brand() {
        let options = RetrievalOptions {
            strategy: FusionStrategy::LexicalHybrid,
            ..Default::default()
        };
        // "rolo" is semantically farthest but the only lexical match
        let e = engine(crowded_rows(), FixtureEmbedder::new(1, &[("rolo", vec![0.0])]), options);
        let results = e.retrieve("rolo", 2).await.unwrap();
        assert_eq!(results[0].metadata.entity_name(), "D");
    }

    #[tokio::test]
    async fn test_single_chunk_index_earns_only_its_boost() {
        let rows = vec![(product("A", "Aero"), 0.0)];
        let e = engine(rows, FixtureEmbedder::new(1, &[("q", vec![0.0])]), RetrievalOptions::default());
        let results = e.retrieve("q", 3).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].breakdown.semantic, 0.0);
        assert!((results[0].breakdown.boost - 0.6).abs() < 1e-6);
        assert!((results[0].score - 0.24).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_lexical_hybrid_without_term_overlap_adds_no_lexical_weight() {
        let options = RetrievalOptions {
            strategy: FusionStrategy::LexicalHybrid,
            ..Default::default()
        };
        let e = engine(crowded_rows(), FixtureEmbedder::new(1, &[("toffee", vec![0.0])]), options);
        for r in e.retrieve("toffee", 4).await.unwrap() {
            assert!(r.score <= HYBRID_SEMANTIC_WEIGHT + 1e-6, "score {} carries lexical weight", r.score);
        }
    }

    #[tokio::test]
    async fn test_blank_brand_and_category_still_boost() {
        let blank = |name: &str| -> ChunkMetadata {
            serde_json::from_value(serde_json::json!({
                "chunk_type": "overview",
                "product_name": name,
                "brand": "",
                "category": "",
            }))
            .unwrap()
        };
        let rows = vec![(blank("A"), 0.0), (blank("B"), 1.0)];
        let e = engine(rows, FixtureEmbedder::new(1, &[("q", vec![0.0])]), RetrievalOptions::default());
        let results = e.retrieve("q", 2).await.unwrap();
        assert_eq!(names(&results), vec!["A", "B"]);
        assert!((results[1].breakdown.boost - 0.6).abs() < 1e-6);
        assert!((results[1].score - 0.24).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_embedding_failure_propagates() {
        let mut embedder = FixtureEmbedder::new(1, &[]);
        embedder.fail = true;
        let e = engine(crowded_rows(), embedder, RetrievalOptions::default());
        let err = e.retrieve("aero", 3).await.unwrap_err();
        assert!(matches!(err, NestragError::Embedding(EmbeddingError::Api { status: 503, .. })));
    }

    #[tokio::test]
    async fn test_request_deadline() {
        let mut embedder = FixtureEmbedder::new(1, &[]);
        embedder.delay = Some(Duration::from_millis(500));
        let options = RetrievalOptions {
            request_timeout: Some(Duration::from_millis(20)),
            ..Default::default()
        };
        let e = engine(crowded_rows(), embedder, options);
        let err = e.retrieve("aero", 3).await.unwrap_err();
        assert!(matches!(err, NestragError::Timeout(20)));
    }

    #[test]
    fn test_context_rejects_model_mismatch() {
        let index = CorpusIndex::new(VectorIndex::new("other-model", 1, vec![]).unwrap(), vec![]).unwrap();
        let result = RetrievalContext::new(
            index,
            RecordStore::default(),
            Arc::new(InMemoryGraph::new()),
            Arc::new(FixtureEmbedder::new(1, &[])),
            LexicalCorpus::Identity,
        );
        assert!(matches!(result, Err(NestragError::Config(_))));
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!("graph_boost".parse::<FusionStrategy>().unwrap(), FusionStrategy::GraphBoost);
        assert_eq!("lexical_hybrid".parse::<FusionStrategy>().unwrap(), FusionStrategy::LexicalHybrid);
        let err = "rrf".parse::<FusionStrategy>().unwrap_err();
        assert!(matches!(err, NestragError::Validation { .. }));
    }

    #[test]
    fn test_options_from_config() {
        let config = RetrievalConfig {
            request_timeout_ms: Some(250),
            ..Default::default()
        };
        let options = RetrievalOptions::from_config(&config).unwrap();
        assert_eq!(options.strategy, FusionStrategy::GraphBoost);
        assert_eq!(options.request_timeout, Some(Duration::from_millis(250)));
    }
}
