//! Semantic, grep, hybrid, and batch retrieval, plus the cache of opened ANN
//! searchers that backs semantic search.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use regex::RegexBuilder;
use serde_json::Value;

use crate::ann::{AnnSearcher, BruteForceSearcher};
use crate::embedder::Embedder;
use crate::error::RagResult;
use crate::filter::Filter;
use crate::storage::Store;
use crate::types::Chunk;

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub search_complexity: u32,
    pub include_content: bool,
    pub include_metadata: bool,
    pub min_score: f32,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            search_complexity: 32,
            include_content: true,
            include_metadata: true,
            min_score: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SemanticHit {
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct GrepHit {
    pub chunk: Chunk,
    pub match_positions: Vec<(usize, usize)>,
}

#[derive(Debug, Clone)]
pub struct HybridHit {
    pub chunk: Chunk,
    pub score: f32,
}

pub struct BatchQuery {
    pub id: String,
    pub query: String,
    pub top_k: usize,
}

pub struct BatchResultItem {
    pub results: Vec<SemanticHit>,
    pub total_found: usize,
}

/// `OpenANN`/`InvalidateCache` cache of per-index searchers. Invalidated by
/// the caller after a rebuild or a delete.
pub struct Searcher {
    store: Arc<Store>,
    embedder: Arc<dyn Embedder>,
    cache: Mutex<HashMap<String, Arc<dyn AnnSearcher>>>,
}

impl Searcher {
    pub fn new(store: Arc<Store>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store,
            embedder,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn invalidate_cache(&self, index: &str) {
        self.cache.lock().remove(index);
    }

    /// Returns `None` (not an error) when the artifact is missing or fails
    /// to open, so the fallback path can take over.
    fn open_ann(&self, index: &str) -> Option<Arc<dyn AnnSearcher>> {
        if let Some(cached) = self.cache.lock().get(index) {
            return Some(cached.clone());
        }
        let path = self.store.ann_artifact_path(index);
        if !path.is_file() {
            return None;
        }
        match BruteForceSearcher::open(&path, self.embedder.clone()) {
            Ok(searcher) => {
                let searcher: Arc<dyn AnnSearcher> = Arc::new(searcher);
                self.cache.lock().insert(index.to_string(), searcher.clone());
                Some(searcher)
            }
            Err(err) => {
                tracing::warn!(index = %index, error = %err, "failed to open ANN artifact");
                None
            }
        }
    }

    pub fn semantic_search(
        &self,
        index: &str,
        query: &str,
        top_k: usize,
        filters: Option<&HashMap<String, Value>>,
        opts: &SearchOptions,
    ) -> RagResult<Vec<SemanticHit>> {
        let filter = filters.map(Filter::parse).transpose()?;
        let has_filter = filter.as_ref().map(|f| !f.is_empty()).unwrap_or(false);

        if let Some(ann) = self.open_ann(index) {
            let fetch_k = if has_filter { top_k * 2 } else { top_k };
            let ordinal_map = self.store.load_ordinal_map(index)?;

            let hits = match ann.search(query, fetch_k) {
                Ok(hits) => hits,
                Err(err) => {
                    tracing::warn!(index = %index, error = %err, "ANN search failed, falling back to brute force");
                    return self.brute_force_search(index, query, top_k, filter.as_ref(), opts);
                }
            };

            let mut results = Vec::with_capacity(top_k);
            for (ordinal, score) in hits {
                if score < opts.min_score {
                    continue;
                }
                let Some(chunk_id) = ordinal_map.chunk_id_for(ordinal) else {
                    continue;
                };
                let Ok(chunk) = self.store.load_chunk(index, chunk_id) else {
                    continue;
                };
                if let Some(f) = &filter {
                    if !f.matches(chunk.metadata.as_ref().unwrap_or(&Default::default())) {
                        continue;
                    }
                }
                results.push(SemanticHit { chunk, score });
                if results.len() >= top_k {
                    break;
                }
            }
            Ok(results)
        } else {
            self.brute_force_search(index, query, top_k, filter.as_ref(), opts)
        }
    }

    /// Encodes the query and every filter-surviving chunk, ranks by dot
    /// product (vectors assumed L2-normalized), truncates at the first
    /// score below `min_score`.
    fn brute_force_search(
        &self,
        index: &str,
        query: &str,
        top_k: usize,
        filter: Option<&Filter>,
        opts: &SearchOptions,
    ) -> RagResult<Vec<SemanticHit>> {
        let chunk_ids = self.store.enumerate_chunk_ids(index)?;
        let mut candidates = Vec::new();
        for chunk_id in chunk_ids {
            let Ok(chunk) = self.store.load_chunk(index, &chunk_id) else {
                continue;
            };
            if let Some(f) = filter {
                if !f.matches(chunk.metadata.as_ref().unwrap_or(&Default::default())) {
                    continue;
                }
            }
            candidates.push(chunk);
        }

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let query_vec = match self.embedder.encode(&[query], true) {
            Ok(v) => v[0].clone(),
            Err(_) => return Ok(Vec::new()),
        };
        let texts: Vec<&str> = candidates.iter().map(|c| c.content.as_str()).collect();
        let vectors = match self.embedder.encode(&texts, true) {
            Ok(v) => v,
            Err(_) => return Ok(Vec::new()),
        };

        let mut scored: Vec<(Chunk, f32)> = candidates
            .into_iter()
            .zip(vectors)
            .map(|(chunk, v)| {
                let score: f32 = v.iter().zip(query_vec.iter()).map(|(a, b)| a * b).sum();
                (chunk, score)
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut results = Vec::with_capacity(top_k.min(scored.len()));
        for (chunk, score) in scored {
            if score < opts.min_score {
                break;
            }
            results.push(SemanticHit { chunk, score });
            if results.len() >= top_k {
                break;
            }
        }
        Ok(results)
    }

    /// Case-insensitive literal substring match. Returns the first `top_k`
    /// chunks (in storage order) with at least one match.
    pub fn grep_search(
        &self,
        index: &str,
        query: &str,
        top_k: usize,
        filters: Option<&HashMap<String, Value>>,
    ) -> RagResult<Vec<GrepHit>> {
        let filter = filters.map(Filter::parse).transpose()?;
        let pattern = RegexBuilder::new(&regex::escape(query))
            .case_insensitive(true)
            .build()
            .map_err(|e| crate::error::RagError::validation(e.to_string()))?;

        let mut results = Vec::with_capacity(top_k);
        for chunk_id in self.store.enumerate_chunk_ids(index)? {
            if results.len() >= top_k {
                break;
            }
            let Ok(chunk) = self.store.load_chunk(index, &chunk_id) else {
                continue;
            };
            if let Some(f) = &filter {
                if !f.matches(chunk.metadata.as_ref().unwrap_or(&Default::default())) {
                    continue;
                }
            }
            let positions: Vec<(usize, usize)> = pattern
                .find_iter(&chunk.content)
                .map(|m| (m.start(), m.end()))
                .collect();
            if !positions.is_empty() {
                results.push(GrepHit {
                    chunk,
                    match_positions: positions,
                });
            }
        }
        Ok(results)
    }

    /// Runs semantic and grep with `top_k * 3` each, unions by `chunk_id`,
    /// and combines `semantic_weight * sem + keyword_weight * kw` with no
    /// renormalization of either side.
    pub fn hybrid_search(
        &self,
        index: &str,
        query: &str,
        top_k: usize,
        semantic_weight: f32,
        keyword_weight: f32,
        filters: Option<&HashMap<String, Value>>,
    ) -> RagResult<Vec<HybridHit>> {
        let fetch_k = top_k * 3;
        let semantic = self.semantic_search(index, query, fetch_k, filters, &SearchOptions::default())?;
        let grep = self.grep_search(index, query, fetch_k, filters)?;

        let grep_len = grep.len().max(1) as f32;
        let mut combined: HashMap<String, (Chunk, f32)> = HashMap::new();

        for hit in semantic {
            combined.insert(hit.chunk.chunk_id.clone(), (hit.chunk, semantic_weight * hit.score));
        }
        for (rank, hit) in grep.into_iter().enumerate() {
            let keyword_score = (grep_len - rank as f32) / grep_len;
            combined
                .entry(hit.chunk.chunk_id.clone())
                .and_modify(|(_, s)| *s += keyword_weight * keyword_score)
                .or_insert((hit.chunk, keyword_weight * keyword_score));
        }

        let mut results: Vec<HybridHit> = combined
            .into_values()
            .map(|(chunk, score)| HybridHit { chunk, score })
            .collect();
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(top_k);
        Ok(results)
    }

    /// Each query runs as an independent semantic search; queries may
    /// execute concurrently. Result ordering within an entry is preserved.
    pub async fn batch_search(
        &self,
        index: &str,
        queries: Vec<BatchQuery>,
        filters: Option<&HashMap<String, Value>>,
    ) -> RagResult<(HashMap<String, BatchResultItem>, u64)> {
        let started = Instant::now();
        let filters = filters.cloned();

        let tasks = queries.into_iter().map(|q| {
            let filters = filters.clone();
            async move {
                let hits = self.semantic_search(index, &q.query, q.top_k, filters.as_ref(), &SearchOptions::default());
                (q.id, hits)
            }
        });

        let outcomes = futures::future::join_all(tasks).await;

        let mut out = HashMap::with_capacity(outcomes.len());
        for (id, hits) in outcomes {
            let hits = hits?;
            out.insert(
                id,
                BatchResultItem {
                    total_found: hits.len(),
                    results: hits,
                },
            );
        }

        Ok((out, started.elapsed().as_millis() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ann::{AnnBuilder, BruteForceAnn};
    use crate::embedder::HashEmbedder;
    use crate::types::{AnnBackend, Chunk, IndexSettings};
    use std::path::PathBuf;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("ragindex-searcher-test-{}", uuid::Uuid::new_v4()))
    }

    fn write_index(root: &PathBuf, chunks: &[(&str, &str)]) -> Arc<Store> {
        let store = Arc::new(Store::new(root).unwrap());
        let settings = IndexSettings {
            backend: AnnBackend::Hnsw,
            embedding_model: "hash-fake".to_string(),
            graph_degree: 32,
            build_complexity: 64,
            chunk_size: 512,
            chunk_overlap: 64,
        };
        let meta = crate::types::IndexMetadata {
            name: "t".to_string(),
            created_at: chrono::Utc::now(),
            updated_at: None,
            chunk_count: chunks.len() as u64,
            total_characters: chunks.iter().map(|(_, c)| c.len() as u64).sum(),
            settings,
        };
        store.save_index_metadata(&meta).unwrap();
        for (id, content) in chunks {
            store
                .write_chunk(
                    "t",
                    &Chunk {
                        chunk_id: id.to_string(),
                        document_id: id.split("_chunk_").next().unwrap().to_string(),
                        position: 0,
                        content: content.to_string(),
                        metadata: None,
                    },
                )
                .unwrap();
        }
        store
    }

    #[test]
    fn grep_reports_byte_range_match_positions() {
        let root = temp_root();
        let store = write_index(
            &root,
            &[("d1_chunk_0", "ERROR_CODE_001: Connection timeout.")],
        );
        let embedder = Arc::new(HashEmbedder::new(32, 16));
        let searcher = Searcher::new(store, embedder);

        let hits = searcher.grep_search("t", "error_code_001", 10, None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].match_positions, vec![(0, 14)]);

        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn hybrid_fusion_ranks_grep_hit_above_higher_semantic_score() {
        let root = temp_root();
        let store = write_index(
            &root,
            &[
                ("d1_chunk_0", "alpha beta"),
                ("d2_chunk_0", "gamma delta gamma"),
            ],
        );

        let mut builder = BruteForceAnn::new(IndexSettings {
            backend: AnnBackend::Hnsw,
            embedding_model: "hash-fake".to_string(),
            graph_degree: 32,
            build_complexity: 64,
            chunk_size: 512,
            chunk_overlap: 64,
        });
        builder.add_text("alpha beta").unwrap();
        builder.add_text("gamma delta gamma").unwrap();
        builder.build_index(&store.ann_artifact_path("t")).unwrap();
        store
            .save_ordinal_map(
                "t",
                &crate::types::OrdinalMap(vec![
                    "d1_chunk_0".to_string(),
                    "d2_chunk_0".to_string(),
                ]),
            )
            .unwrap();

        let embedder = Arc::new(HashEmbedder::new(32, 16));
        let searcher = Searcher::new(store, embedder);

        let hits = searcher
            .hybrid_search("t", "gamma", 10, 0.5, 0.5, None)
            .unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].chunk.chunk_id, "d2_chunk_0");

        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn batch_search_preserves_per_query_ordering() {
        let root = temp_root();
        let store = write_index(
            &root,
            &[("d1_chunk_0", "alpha beta"), ("d2_chunk_0", "gamma delta")],
        );
        let embedder = Arc::new(HashEmbedder::new(32, 16));
        let searcher = Searcher::new(store, embedder);

        let queries = vec![
            BatchQuery { id: "q1".to_string(), query: "alpha".to_string(), top_k: 5 },
            BatchQuery { id: "q2".to_string(), query: "gamma".to_string(), top_k: 5 },
        ];
        let (results, _elapsed_ms) = searcher.batch_search("t", queries, None).await.unwrap();

        assert_eq!(results.len(), 2);
        assert!(results.contains_key("q1"));
        assert!(results.contains_key("q2"));

        std::fs::remove_dir_all(&root).ok();
    }
}
