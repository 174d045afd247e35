//! Tenant lifecycle: create, inspect, list, delete, rebuild.
//!
//! Status is computed fresh over filesystem state on every read — there is no
//! cached "is building" flag, so a concurrent observer mid-rebuild may
//! briefly see `building`. Concurrent rebuilds of the same index are
//! serialized by a per-index mutex, grounded on the teacher's guarded
//! in-memory collection pattern (`space.rs`) but adapted so only the rebuild
//! path takes the lock — everything else reads the filesystem directly.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use parking_lot::Mutex;

use crate::ann::{AnnBuilder, BruteForceAnn};
use crate::embedder::Embedder;
use crate::error::{RagError, RagResult};
use crate::storage::Store;
use crate::types::{Index, IndexMetadata, IndexSettings, IndexStatistics, IndexStatus, OrdinalMap};

pub struct Registry {
    store: Arc<Store>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Registry {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub fn create(&self, name: &str, settings: IndexSettings) -> RagResult<Index> {
        if !is_valid_name(name) {
            return Err(RagError::validation(
                "index name must match ^[A-Za-z][A-Za-z0-9_]*$ and be 1-64 chars",
            ));
        }
        if self.store.index_exists(name) {
            return Err(RagError::IndexAlreadyExists(name.to_string()));
        }
        settings.validate()?;

        let meta = IndexMetadata {
            name: name.to_string(),
            created_at: Utc::now(),
            updated_at: None,
            chunk_count: 0,
            total_characters: 0,
            settings,
        };
        self.store.save_index_metadata(&meta)?;
        self.to_index(meta)
    }

    pub fn get(&self, name: &str) -> RagResult<(Index, IndexStatistics)> {
        let meta = self.store.load_index_metadata(name)?;
        let documents = self.store.enumerate_documents(name)?;

        let mut fields: Vec<String> = documents
            .iter()
            .filter_map(|d| d.metadata.as_ref())
            .flat_map(|m| m.keys().cloned())
            .collect();
        fields.sort();
        fields.dedup();

        let avg_chunk_size = if meta.chunk_count > 0 {
            meta.total_characters as f64 / meta.chunk_count as f64
        } else {
            0.0
        };

        let stats = IndexStatistics {
            total_characters: meta.total_characters,
            avg_chunk_size,
            metadata_fields: fields,
        };

        Ok((self.to_index(meta)?, stats))
    }

    /// Malformed index directories are skipped with a warning, never failing
    /// the whole call.
    pub fn list(&self) -> RagResult<Vec<Index>> {
        let mut out = Vec::new();
        for name in self.store.list_indexes()? {
            match self.store.load_index_metadata(&name).and_then(|m| self.to_index(m)) {
                Ok(index) => out.push(index),
                Err(err) => {
                    tracing::warn!(index = %name, error = %err, "skipping malformed index directory");
                }
            }
        }
        Ok(out)
    }

    pub fn delete(&self, name: &str) -> RagResult<()> {
        self.store.delete_index_tree(name)
    }

    /// Additive counter update, applied as a single call after a batch.
    pub fn update_counters(&self, name: &str, delta_chunks: i64, delta_characters: i64) -> RagResult<()> {
        let mut meta = self.store.load_index_metadata(name)?;
        meta.chunk_count = (meta.chunk_count as i64 + delta_chunks).max(0) as u64;
        meta.total_characters = (meta.total_characters as i64 + delta_characters).max(0) as u64;
        meta.updated_at = Some(Utc::now());
        self.store.save_index_metadata(&meta)
    }

    /// Runs the build protocol: snapshot the chunk_ids enumerated at the
    /// start of the pass (later ingests are not included), feed their text
    /// to an `AnnBuilder`, write the artifact and the OrdinalMap atomically,
    /// then bump `updated_at` and `chunk_count`. Returns `(chunks, elapsed_ms)`.
    pub fn rebuild(
        &self,
        name: &str,
        settings: Option<IndexSettings>,
        embedder: Arc<dyn Embedder>,
    ) -> RagResult<(u64, u64)> {
        let guard = self.lock_for(name);
        let _held = guard.lock();

        let started = Instant::now();
        let mut meta = self.store.load_index_metadata(name)?;
        if let Some(new_settings) = settings {
            new_settings.validate()?;
            meta.settings = new_settings;
        }

        let chunk_ids = self.store.enumerate_chunk_ids(name)?;
        let _ = embedder; // the ANN builder embeds internally; kept for future native backends

        let mut builder = BruteForceAnn::new(meta.settings.clone());
        for chunk_id in &chunk_ids {
            let chunk = self.store.load_chunk(name, chunk_id)?;
            builder.add_text(&chunk.content)?;
        }
        builder
            .build_index(&self.store.ann_artifact_path(name))
            .map_err(RagError::Internal)?;

        self.store
            .save_ordinal_map(name, &OrdinalMap(chunk_ids.clone()))?;

        meta.chunk_count = chunk_ids.len() as u64;
        meta.updated_at = Some(Utc::now());
        self.store.save_index_metadata(&meta)?;

        Ok((chunk_ids.len() as u64, started.elapsed().as_millis() as u64))
    }

    fn to_index(&self, meta: IndexMetadata) -> RagResult<Index> {
        let status = if meta.chunk_count == 0 {
            IndexStatus::Empty
        } else if self.store.ann_artifact_path(&meta.name).is_file() {
            IndexStatus::Ready
        } else {
            IndexStatus::Building
        };

        Ok(Index {
            name: meta.name,
            created_at: meta.created_at,
            updated_at: meta.updated_at,
            chunk_count: meta.chunk_count,
            total_characters: meta.total_characters,
            settings: meta.settings,
            status,
        })
    }
}

fn is_valid_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 64 {
        return false;
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::HashEmbedder;
    use std::path::PathBuf;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("ragindex-registry-test-{}", uuid::Uuid::new_v4()))
    }

    fn settings() -> IndexSettings {
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
    fn create_rejects_invalid_name() {
        let root = temp_root();
        let registry = Registry::new(Arc::new(Store::new(&root).unwrap()));
        let err = registry.create("1bad", settings()).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::ValidationError);
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn create_twice_conflicts() {
        let root = temp_root();
        let registry = Registry::new(Arc::new(Store::new(&root).unwrap()));
        registry.create("t", settings()).unwrap();
        let err = registry.create("t", settings()).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::IndexAlreadyExists);
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn status_transitions_empty_to_ready() {
        let root = temp_root();
        let store = Arc::new(Store::new(&root).unwrap());
        let registry = Registry::new(store.clone());
        let index = registry.create("t", settings()).unwrap();
        assert_eq!(index.status, IndexStatus::Empty);

        store
            .write_chunk(
                "t",
                &crate::types::Chunk {
                    chunk_id: "doc1_chunk_0".to_string(),
                    document_id: "doc1".to_string(),
                    position: 0,
                    content: "hello world".to_string(),
                    metadata: None,
                },
            )
            .unwrap();
        registry.update_counters("t", 1, 11).unwrap();

        let (index, _stats) = registry.get("t").unwrap();
        assert_eq!(index.status, IndexStatus::Building);

        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(32, 16));
        let (count, _ms) = registry.rebuild("t", None, embedder).unwrap();
        assert_eq!(count, 1);

        let (index, _stats) = registry.get("t").unwrap();
        assert_eq!(index.status, IndexStatus::Ready);

        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn rebuild_is_idempotent_in_ordinal_map_length() {
        let root = temp_root();
        let store = Arc::new(Store::new(&root).unwrap());
        let registry = Registry::new(store.clone());
        registry.create("t", settings()).unwrap();

        store
            .write_chunk(
                "t",
                &crate::types::Chunk {
                    chunk_id: "doc1_chunk_0".to_string(),
                    document_id: "doc1".to_string(),
                    position: 0,
                    content: "x".to_string(),
                    metadata: None,
                },
            )
            .unwrap();
        registry.update_counters("t", 1, 1).unwrap();

        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(32, 16));
        registry.rebuild("t", None, embedder.clone()).unwrap();
        let first = store.load_ordinal_map("t").unwrap();
        registry.rebuild("t", None, embedder).unwrap();
        let second = store.load_ordinal_map("t").unwrap();

        assert_eq!(first.len(), second.len());
        assert_eq!(first.0, second.0);

        std::fs::remove_dir_all(&root).ok();
    }
}
