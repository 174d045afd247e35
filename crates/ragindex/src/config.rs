//! Process-wide configuration, read from the environment with the original
//! service's defaults. Per-index settings (`IndexSettings`) are validated
//! independently at create/rebuild time; this config only supplies defaults
//! for requests that don't specify them.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::{AnnBackend, IndexSettings};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RAGConfig {
    pub data_dir: PathBuf,
    pub ann: AnnConfig,
    pub embedding: EmbeddingConfig,
    pub chunking: ChunkingConfig,
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnConfig {
    pub backend: AnnBackend,
    pub graph_degree: u32,
    pub build_complexity: u32,
    pub search_complexity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    pub mode: String,
    pub cache_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub default_top_k: usize,
    pub max_top_k: usize,
    pub max_upload_size_mb: usize,
}

impl RAGConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(8..=128).contains(&self.ann.graph_degree) {
            return Err("ann.graph_degree must be in [8,128]".into());
        }
        if !(32..=512).contains(&self.ann.build_complexity) {
            return Err("ann.build_complexity must be in [32,512]".into());
        }
        if !(64..=4096).contains(&self.chunking.chunk_size) {
            return Err("chunking.chunk_size must be in [64,4096]".into());
        }
        if self.chunking.chunk_overlap > 512 {
            return Err("chunking.chunk_overlap must be in [0,512]".into());
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err("chunking.chunk_overlap must be < chunk_size".into());
        }
        if self.search.default_top_k == 0 || self.search.default_top_k > self.search.max_top_k {
            return Err("search.default_top_k must be in (0, max_top_k]".into());
        }
        Ok(())
    }

    /// Builds the default `IndexSettings` a new index gets when the caller
    /// does not specify its own.
    pub fn default_index_settings(&self) -> IndexSettings {
        IndexSettings {
            backend: self.ann.backend,
            embedding_model: self.embedding.model.clone(),
            graph_degree: self.ann.graph_degree,
            build_complexity: self.ann.build_complexity,
            chunk_size: self.chunking.chunk_size,
            chunk_overlap: self.chunking.chunk_overlap,
        }
    }

    /// Loads overrides from environment variables, falling back to defaults
    /// for anything unset. `HOST`/`PORT`/`WORKERS`/`LOG_LEVEL` are part of
    /// the original settings table but belong to the external transport
    /// layer; they are not read here.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("INDEX_DIR") {
            config.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("LEANN_BACKEND") {
            config.ann.backend = match v.as_str() {
                "diskann" => AnnBackend::Diskann,
                _ => AnnBackend::Hnsw,
            };
        }
        if let Some(v) = parse_env("GRAPH_DEGREE") {
            config.ann.graph_degree = v;
        }
        if let Some(v) = parse_env("BUILD_COMPLEXITY") {
            config.ann.build_complexity = v;
        }
        if let Some(v) = parse_env("SEARCH_COMPLEXITY") {
            config.ann.search_complexity = v;
        }
        if let Ok(v) = std::env::var("EMBEDDING_MODEL") {
            config.embedding.model = v;
        }
        if let Ok(v) = std::env::var("EMBEDDING_MODE") {
            config.embedding.mode = v;
        }
        if let Some(v) = parse_env("DEFAULT_CHUNK_SIZE") {
            config.chunking.chunk_size = v;
        }
        if let Some(v) = parse_env("DEFAULT_CHUNK_OVERLAP") {
            config.chunking.chunk_overlap = v;
        }
        if let Some(v) = parse_env("DEFAULT_TOP_K") {
            config.search.default_top_k = v;
        }
        if let Some(v) = parse_env("MAX_TOP_K") {
            config.search.max_top_k = v;
        }
        if let Some(v) = parse_env("MAX_UPLOAD_SIZE_MB") {
            config.search.max_upload_size_mb = v;
        }

        config
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

impl Default for RAGConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ragindex")
            .join("indexes");

        Self {
            data_dir,
            ann: AnnConfig {
                backend: AnnBackend::Hnsw,
                graph_degree: 32,
                build_complexity: 64,
                search_complexity: 32,
            },
            embedding: EmbeddingConfig {
                model: "cl-nagoya/ruri-v3-310m".to_string(),
                mode: "sentence-transformers".to_string(),
                cache_size: 1000,
            },
            chunking: ChunkingConfig {
                chunk_size: 512,
                chunk_overlap: 64,
            },
            search: SearchConfig {
                default_top_k: 10,
                max_top_k: 100,
                max_upload_size_mb: 10,
            },
        }
    }
}
