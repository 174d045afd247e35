//! The ANN library as an external contract: a `Builder` consumes a stream of
//! texts and produces an opaque artifact at a path; a `Searcher` opens that
//! artifact and returns `(ordinal, score)` pairs in descending score order.
//! `ordinal` is the zero-based position of the corresponding `add_text` call
//! during build — the caller (the Store's OrdinalMap) owns the ordinal to
//! chunk_id mapping, never this module.

use std::path::Path;

use anyhow::Result;

use crate::types::IndexSettings;

pub trait AnnBuilder: Send + Sync {
    fn add_text(&mut self, content: &str) -> Result<()>;
    fn build_index(&mut self, path: &Path) -> Result<()>;
}

pub trait AnnSearcher: Send + Sync {
    fn search(&self, query: &str, top_k: usize) -> Result<Vec<(u64, f32)>>;
}

/// Brute-force cosine-similarity stub used by tests and as the in-process
/// default when no native ANN library is wired in. Holds every embedded text
/// in memory in build order, so ordinal == insertion order by construction.
pub struct BruteForceAnn {
    settings: IndexSettings,
    texts: Vec<String>,
}

impl BruteForceAnn {
    pub fn new(settings: IndexSettings) -> Self {
        Self {
            settings,
            texts: Vec::new(),
        }
    }
}

impl AnnBuilder for BruteForceAnn {
    fn add_text(&mut self, content: &str) -> Result<()> {
        self.texts.push(content.to_string());
        Ok(())
    }

    fn build_index(&mut self, path: &Path) -> Result<()> {
        let body = serde_json::to_string(&BruteForceArtifact {
            embedding_model: self.settings.embedding_model.clone(),
            texts: self.texts.clone(),
        })?;
        std::fs::write(path, body)?;
        Ok(())
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct BruteForceArtifact {
    embedding_model: String,
    texts: Vec<String>,
}

/// Opens a `BruteForceAnn` artifact and answers `search` by encoding the
/// query and every stored text with the same embedder, then ranking by dot
/// product (vectors are assumed L2-normalized by the embedder contract).
pub struct BruteForceSearcher {
    texts: Vec<String>,
    embedder: std::sync::Arc<dyn crate::embedder::Embedder>,
}

impl BruteForceSearcher {
    pub fn open(path: &Path, embedder: std::sync::Arc<dyn crate::embedder::Embedder>) -> Result<Self> {
        let body = std::fs::read_to_string(path)?;
        let artifact: BruteForceArtifact = serde_json::from_str(&body)?;
        Ok(Self {
            texts: artifact.texts,
            embedder,
        })
    }
}

impl AnnSearcher for BruteForceSearcher {
    fn search(&self, query: &str, top_k: usize) -> Result<Vec<(u64, f32)>> {
        if self.texts.is_empty() {
            return Ok(Vec::new());
        }
        let query_vec = &self.embedder.encode(&[query], true)?[0];
        let refs: Vec<&str> = self.texts.iter().map(String::as_str).collect();
        let doc_vecs = self.embedder.encode(&refs, true)?;

        let mut scored: Vec<(u64, f32)> = doc_vecs
            .iter()
            .enumerate()
            .map(|(ordinal, v)| {
                let dot: f32 = v.iter().zip(query_vec.iter()).map(|(a, b)| a * b).sum();
                (ordinal as u64, dot)
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::HashEmbedder;
    use std::sync::Arc;

    fn test_settings() -> IndexSettings {
        IndexSettings {
            backend: crate::types::AnnBackend::Hnsw,
            embedding_model: "hash-fake".to_string(),
            graph_degree: 32,
            build_complexity: 64,
            chunk_size: 512,
            chunk_overlap: 64,
        }
    }

    #[test]
    fn build_then_search_returns_descending_scores() {
        let dir = std::env::temp_dir().join(format!("ragindex-ann-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("index.leann");

        let mut builder = BruteForceAnn::new(test_settings());
        builder.add_text("alpha beta").unwrap();
        builder.add_text("gamma delta gamma").unwrap();
        builder.build_index(&path).unwrap();

        let embedder = Arc::new(HashEmbedder::new(64, 16));
        let searcher = BruteForceSearcher::open(&path, embedder).unwrap();
        let hits = searcher.search("gamma", 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].1 >= hits[1].1);

        std::fs::remove_dir_all(&dir).ok();
    }
}
