//! Hybrid search engine with RRF fusion and multi-signal ranking.
//!
//! Combines semantic (vector) search, keyword (BM25) search, and symbol
//! table lookup into a single ranked result set, then applies structural,
//! dependency-proximity and recency boosts before an optional cross-encoder
//! rerank pass.
//!
//! Pipeline:
//! 1. Analyze query intent (used later by context assembly)
//! 2. Semantic search via the embedder + vector index (skipped if the
//!    embedder is degraded)
//! 3. Keyword search via BM25 postings
//! 4. Fuse the two rank lists with weighted RRF
//! 5. Apply structural weight, dependency proximity and recency boosts
//! 6. Rerank the top candidates with a cross-encoder, if available
//! 7. Truncate to the requested limit

pub mod context_assembler;
pub mod intent;

use std::collections::HashMap;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::bm25;
use crate::config::{Bm25Config, SearchConfig};
use crate::embedder::Embedder;
use crate::error::OmniResult;
use crate::graph::DependencyGraph;
use crate::index::MetadataIndex;
use crate::reranker::Reranker;
use crate::types::{ContextWindow, ScoreBreakdown, SearchResult};
use crate::vector::VectorIndex;

use context_assembler::ContextAssembler;
use intent::QueryIntent;

/// Which retrieval signal(s) a query should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Vector similarity only.
    Semantic,
    /// BM25 keyword search only.
    Keyword,
    /// Weighted RRF fusion of both (the default).
    Hybrid,
}

/// Hybrid search engine that fuses multiple retrieval signals.
pub struct SearchEngine {
    /// RRF constant k.
    rrf_k: u32,
    /// Weight given to the semantic ranking in fusion.
    semantic_weight: f64,
    /// Weight given to the keyword ranking in fusion.
    keyword_weight: f64,
    /// Maximum dense-vector candidates considered before fusion.
    dense_candidates: usize,
    /// Maximum keyword candidates considered before fusion.
    keyword_candidates: usize,
    /// How much weight the original RRF score keeps when blended with a
    /// reranker score (reranker weight is `1.0 - rrf_weight`).
    reranker_rrf_weight: f64,
    /// Score multiplier applied to candidates beyond the reranker's
    /// candidate window.
    reranker_unranked_demotion: f64,
    /// Max candidates passed to the reranker.
    reranker_max_candidates: usize,
    context_assembler: ContextAssembler,
    reranker: Reranker,
    bm25_config: Bm25Config,
}

impl SearchEngine {
    /// Create a new search engine from configuration.
    pub fn new(search_config: &SearchConfig, bm25_config: &Bm25Config) -> OmniResult<Self> {
        let reranker = Reranker::new(&search_config.reranker)?;
        Ok(Self {
            rrf_k: search_config.rrf_k,
            semantic_weight: search_config.semantic_weight,
            keyword_weight: search_config.keyword_weight,
            dense_candidates: search_config.dense_candidates,
            keyword_candidates: search_config.keyword_candidates,
            reranker_rrf_weight: search_config.reranker.rrf_weight,
            reranker_unranked_demotion: search_config.reranker.unranked_demotion,
            reranker_max_candidates: search_config.reranker.max_candidates,
            context_assembler: ContextAssembler::new(search_config.token_budget),
            reranker,
            bm25_config: bm25_config.clone(),
        })
    }

    /// Execute a hybrid search query against the parser-level chunk index.
    pub fn search(
        &self,
        query: &str,
        limit: usize,
        index: &MetadataIndex,
        vector_index: &VectorIndex,
        embedder: &Embedder,
        dep_graph: &DependencyGraph,
    ) -> OmniResult<Vec<SearchResult>> {
        let (results, _warnings) =
            self.search_with_mode(query, limit, SearchMode::Hybrid, index, vector_index, embedder, dep_graph)?;
        Ok(results)
    }

    /// Execute a search query restricted to a single signal, or fused across
    /// both. Returns any degradation warnings alongside the results (e.g. a
    /// query embedding failure that dropped semantic/hybrid mode to
    /// keyword-only).
    pub fn search_with_mode(
        &self,
        query: &str,
        limit: usize,
        mode: SearchMode,
        index: &MetadataIndex,
        vector_index: &VectorIndex,
        embedder: &Embedder,
        dep_graph: &DependencyGraph,
    ) -> OmniResult<(Vec<SearchResult>, Vec<String>)> {
        // Intent classification informs context assembly downstream; run it
        // here so callers that skip straight to assemble_context still see
        // a consistent strategy for this query.
        let _intent = QueryIntent::classify(query);

        let mut warnings = Vec::new();

        let semantic_ranks = if mode == SearchMode::Keyword {
            HashMap::new()
        } else {
            let ranks = self.semantic_candidates(query, vector_index, embedder);
            if ranks.is_empty() && mode == SearchMode::Semantic && !embedder.is_available() {
                warnings.push("semantic search unavailable; embedder is degraded".to_string());
            } else if ranks.is_empty() && mode == SearchMode::Hybrid && !embedder.is_available() {
                warnings.push("hybrid search degraded to keyword-only; embedder is unavailable".to_string());
            }
            ranks
        };
        let keyword_ranks = if mode == SearchMode::Semantic {
            HashMap::new()
        } else {
            self.keyword_candidates(query, index)?
        };

        let mut chunk_ids: Vec<i64> = semantic_ranks.keys().copied().collect();
        for id in keyword_ranks.keys() {
            if !chunk_ids.contains(id) {
                chunk_ids.push(*id);
            }
        }

        let mut candidates = Vec::with_capacity(chunk_ids.len());
        for chunk_id in chunk_ids {
            let Some(chunk) = index.get_chunk_by_id(chunk_id)? else {
                continue;
            };
            let semantic_rank = semantic_ranks.get(&chunk_id).copied();
            let keyword_rank = keyword_ranks.get(&chunk_id).copied();
            let rrf_score = match mode {
                SearchMode::Semantic => self.rrf_term(semantic_rank),
                SearchMode::Keyword => self.rrf_term(keyword_rank),
                SearchMode::Hybrid => self.weighted_rrf_score(semantic_rank, keyword_rank),
            };

            let structural_weight = chunk.weight;
            let dependency_boost = self.dependency_boost(chunk_id, &chunk_ids_for_boost(&semantic_ranks, &keyword_ranks), index, dep_graph)?;
            let recency_boost = self.recency_boost(chunk.file_id, index)?;

            let score = rrf_score
                + structural_weight * 0.1
                + dependency_boost
                + recency_boost;

            let file_path = index
                .get_file_path_by_id(chunk.file_id)?
                .unwrap_or_default();

            candidates.push(SearchResult {
                chunk,
                file_path,
                score,
                score_breakdown: ScoreBreakdown {
                    semantic_rank,
                    keyword_rank,
                    rrf_score,
                    reranker_score: None,
                    structural_weight,
                    dependency_boost,
                    recency_boost,
                },
            });
        }

        candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        if mode == SearchMode::Hybrid {
            self.apply_reranker(query, &mut candidates);
            candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        }
        candidates.truncate(limit);
        Ok((candidates, warnings))
    }

    /// Assemble a token-budget-aware context window from search results.
    pub fn assemble_context(
        &self,
        query: &str,
        results: Vec<SearchResult>,
        active_file: Option<&Path>,
    ) -> ContextWindow {
        self.context_assembler.assemble(
            query,
            results,
            active_file.map(std::path::PathBuf::from).as_ref(),
        )
    }

    /// Rank from the vector index, keyed by chunk id (None skipped gracefully
    /// if the embedder or vector index are unavailable).
    fn semantic_candidates(
        &self,
        query: &str,
        vector_index: &VectorIndex,
        embedder: &Embedder,
    ) -> HashMap<i64, u32> {
        let mut ranks = HashMap::new();
        if !embedder.is_available() || !vector_index.is_healthy() {
            return ranks;
        }

        let query_vector = match embedder.embed_single(query) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "semantic search skipped, query embedding failed");
                return ranks;
            }
        };

        let hits = match vector_index.search(&query_vector, self.dense_candidates) {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!(error = %e, "semantic search skipped, vector index unavailable");
                return ranks;
            }
        };

        for (rank, (vector_id, _score)) in hits.into_iter().enumerate() {
            ranks.insert(vector_id as i64, (rank + 1) as u32);
        }
        ranks
    }

    /// Rank from BM25 postings, keyed by chunk id.
    fn keyword_candidates(&self, query: &str, index: &MetadataIndex) -> OmniResult<HashMap<i64, u32>> {
        let hits = bm25::search(
            index.connection(),
            "files",
            query,
            self.keyword_candidates,
            &self.bm25_config,
        )?;

        let mut ranks = HashMap::new();
        for (rank, hit) in hits.into_iter().enumerate() {
            if let Ok(chunk_id) = hit.entity_id.parse::<i64>() {
                ranks.insert(chunk_id, (rank + 1) as u32);
            }
        }
        Ok(ranks)
    }

    /// Unweighted RRF contribution from a single rank list.
    fn rrf_term(&self, rank: Option<u32>) -> f64 {
        let k = f64::from(self.rrf_k);
        rank.map_or(0.0, |r| 1.0 / (k + f64::from(r)))
    }

    /// Compute RRF score from two rank lists (unweighted; used directly by
    /// callers that don't care about the configured semantic/keyword split).
    pub fn rrf_score(&self, semantic_rank: Option<u32>, keyword_rank: Option<u32>) -> f64 {
        self.rrf_term(semantic_rank) + self.rrf_term(keyword_rank)
    }

    /// Weighted RRF fusion (0.7 semantic / 0.3 keyword by default).
    fn weighted_rrf_score(&self, semantic_rank: Option<u32>, keyword_rank: Option<u32>) -> f64 {
        self.semantic_weight * self.rrf_term(semantic_rank)
            + self.keyword_weight * self.rrf_term(keyword_rank)
    }

    /// Small boost for candidates that sit within two hops (in either
    /// direction) of another candidate already in the result set, on the
    /// theory that code clusters that reference each other are jointly
    /// relevant to the query.
    fn dependency_boost(
        &self,
        chunk_id: i64,
        other_chunk_ids: &[i64],
        index: &MetadataIndex,
        dep_graph: &DependencyGraph,
    ) -> OmniResult<f64> {
        let Some(symbol) = index.get_symbol_for_chunk(chunk_id)? else {
            return Ok(0.0);
        };

        let mut boost = 0.0;
        for &other_id in other_chunk_ids {
            if other_id == chunk_id {
                continue;
            }
            let Some(other_symbol) = index.get_symbol_for_chunk(other_id)? else {
                continue;
            };
            if let Some(distance) = dep_graph.distance(symbol.id, other_symbol.id)? {
                if distance >= 1 && distance <= 2 {
                    boost += 0.05 / distance as f64;
                }
            }
        }
        Ok(boost.min(0.1))
    }

    /// Small boost for recently modified files, decaying over ~30 days.
    fn recency_boost(&self, file_id: i64, index: &MetadataIndex) -> OmniResult<f64> {
        let Some(updated_at) = index.get_file_updated_at(file_id)? else {
            return Ok(0.0);
        };
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(updated_at);
        let age_days = ((now - updated_at).max(0) as f64) / 86_400.0;
        Ok(0.05 / (1.0 + age_days / 30.0))
    }

    /// Rerank the top candidates with the cross-encoder and blend with the
    /// fused score. Candidates beyond the reranker's window are demoted
    /// rather than dropped, so a strong fused score can still surface them.
    fn apply_reranker(&self, query: &str, candidates: &mut [SearchResult]) {
        if !self.reranker.is_available() || candidates.is_empty() {
            return;
        }

        let window = self.reranker_max_candidates.min(candidates.len());
        let documents: Vec<&str> = candidates[..window]
            .iter()
            .map(|c| c.chunk.content.as_str())
            .collect();
        let scores = self.reranker.rerank(query, &documents);

        for (candidate, reranker_score) in candidates[..window].iter_mut().zip(scores) {
            if let Some(score) = reranker_score {
                let normalized = 1.0 / (1.0 + (-score as f64).exp());
                candidate.score = self.reranker_rrf_weight * candidate.score
                    + (1.0 - self.reranker_rrf_weight) * normalized;
                candidate.score_breakdown.reranker_score = Some(score as f64);
            }
        }

        for candidate in candidates[window..].iter_mut() {
            candidate.score *= self.reranker_unranked_demotion;
        }
    }
}

fn chunk_ids_for_boost(semantic: &HashMap<i64, u32>, keyword: &HashMap<i64, u32>) -> Vec<i64> {
    let mut ids: Vec<i64> = semantic.keys().copied().collect();
    for id in keyword.keys() {
        if !ids.contains(id) {
            ids.push(*id);
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchConfig;

    fn make_engine() -> SearchEngine {
        // Avoid a network fetch for the reranker model in tests.
        std::env::set_var("OMNI_DISABLE_RERANKER", "1");
        SearchEngine::new(&SearchConfig::default(), &Bm25Config::default()).unwrap()
    }

    #[test]
    fn test_rrf_score_both_signals() {
        let engine = make_engine();
        let score = engine.rrf_score(Some(1), Some(1));
        let expected = 2.0 / 61.0;
        assert!((score - expected).abs() < 1e-10);
    }

    #[test]
    fn test_rrf_score_semantic_only() {
        let engine = make_engine();
        let score = engine.rrf_score(Some(1), None);
        let expected = 1.0 / 61.0;
        assert!((score - expected).abs() < 1e-10);
    }

    #[test]
    fn test_rrf_score_no_signal() {
        let engine = make_engine();
        let score = engine.rrf_score(None, None);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_rrf_higher_rank_gets_higher_score() {
        let engine = make_engine();
        let score_rank1 = engine.rrf_score(Some(1), Some(1));
        let score_rank10 = engine.rrf_score(Some(10), Some(10));
        assert!(score_rank1 > score_rank10);
    }

    #[test]
    fn test_weighted_rrf_favours_semantic_by_default() {
        let engine = make_engine();
        let semantic_only = engine.weighted_rrf_score(Some(1), None);
        let keyword_only = engine.weighted_rrf_score(None, Some(1));
        assert!(semantic_only > keyword_only);
    }

    #[test]
    fn test_search_empty_index_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let index = MetadataIndex::open(&dir.path().join("t.db")).unwrap();
        let vector_index = VectorIndex::open(&dir.path().join("v.bin"), 8).unwrap();
        let embedder = Embedder::degraded(&crate::config::EmbeddingConfig::default());
        let dep_graph = DependencyGraph::new();
        let engine = make_engine();

        let results = engine
            .search("anything", 10, &index, &vector_index, &embedder, &dep_graph)
            .unwrap();
        assert!(results.is_empty());
    }
}
