//! Durable per-index layout and whole-file JSON persistence.
//!
//! Layout rooted at `<index_dir>/<name>/`:
//! - `metadata.json` — index settings and counters
//! - `documents/<doc_id>.json`
//! - `chunks/<chunk_id>.json`
//! - `chunk_mapping.json` — the OrdinalMap
//! - `index.leann` — the ANN artifact (opaque)
//!
//! The store enforces no cross-file transaction: higher layers order writes
//! so an interrupted ingest leaves a consistent (possibly stale) state.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{RagError, RagResult};
use crate::types::{Document, IndexMetadata, OrdinalMap};

pub struct Store {
    root: PathBuf,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> RagResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn index_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn metadata_path(&self, name: &str) -> PathBuf {
        self.index_dir(name).join("metadata.json")
    }

    fn documents_dir(&self, name: &str) -> PathBuf {
        self.index_dir(name).join("documents")
    }

    fn chunks_dir(&self, name: &str) -> PathBuf {
        self.index_dir(name).join("chunks")
    }

    fn document_path(&self, name: &str, doc_id: &str) -> PathBuf {
        self.documents_dir(name).join(format!("{doc_id}.json"))
    }

    fn chunk_path(&self, name: &str, chunk_id: &str) -> PathBuf {
        self.chunks_dir(name).join(format!("{chunk_id}.json"))
    }

    pub fn ordinal_map_path(&self, name: &str) -> PathBuf {
        self.index_dir(name).join("chunk_mapping.json")
    }

    pub fn ann_artifact_path(&self, name: &str) -> PathBuf {
        self.index_dir(name).join("index.leann")
    }

    pub fn index_exists(&self, name: &str) -> bool {
        self.metadata_path(name).is_file()
    }

    /// Lists index names present on disk. A directory without a readable
    /// `metadata.json` is not an index and is silently excluded — callers
    /// that need visibility into malformed directories use `list_indexes`
    /// on the registry, which logs a warning per skip.
    pub fn list_indexes(&self) -> RagResult<Vec<String>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if self.metadata_path(&name).is_file() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn load_index_metadata(&self, name: &str) -> RagResult<IndexMetadata> {
        let path = self.metadata_path(name);
        let body = fs::read_to_string(&path).map_err(|_| RagError::IndexNotFound(name.to_string()))?;
        Ok(serde_json::from_str(&body)?)
    }

    pub fn save_index_metadata(&self, meta: &IndexMetadata) -> RagResult<()> {
        fs::create_dir_all(self.index_dir(&meta.name))?;
        fs::create_dir_all(self.documents_dir(&meta.name))?;
        fs::create_dir_all(self.chunks_dir(&meta.name))?;
        write_json(&self.metadata_path(&meta.name), meta)
    }

    pub fn load_document(&self, name: &str, doc_id: &str) -> RagResult<Document> {
        let path = self.document_path(name, doc_id);
        let body =
            fs::read_to_string(&path).map_err(|_| RagError::DocumentNotFound(doc_id.to_string()))?;
        Ok(serde_json::from_str(&body)?)
    }

    pub fn save_document(&self, name: &str, document: &Document) -> RagResult<()> {
        write_json(&self.document_path(name, &document.id), document)
    }

    pub fn delete_document(&self, name: &str, doc_id: &str) -> RagResult<()> {
        let path = self.document_path(name, doc_id);
        if path.is_file() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Documents in arbitrary directory-listing order; callers sort as needed.
    pub fn enumerate_documents(&self, name: &str) -> RagResult<Vec<Document>> {
        let dir = self.documents_dir(name);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut docs = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.path().extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let body = fs::read_to_string(entry.path())?;
            docs.push(serde_json::from_str(&body)?);
        }
        Ok(docs)
    }

    /// Chunk ids in lexicographic order — the deterministic presentation
    /// order used when enumerating for a rebuild.
    pub fn enumerate_chunk_ids(&self, name: &str) -> RagResult<Vec<String>> {
        let dir = self.chunks_dir(name);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut ids: Vec<String> = fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let path = e.path();
                if path.extension().and_then(|e| e.to_str()) == Some("json") {
                    path.file_stem().map(|s| s.to_string_lossy().into_owned())
                } else {
                    None
                }
            })
            .collect();
        ids.sort();
        Ok(ids)
    }

    pub fn load_chunk(&self, name: &str, chunk_id: &str) -> RagResult<crate::types::Chunk> {
        let path = self.chunk_path(name, chunk_id);
        let body = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&body)?)
    }

    pub fn write_chunk(&self, name: &str, chunk: &crate::types::Chunk) -> RagResult<()> {
        write_json(&self.chunk_path(name, &chunk.chunk_id), chunk)
    }

    /// Deletes every chunk file whose id is prefixed `{document_id}_chunk_`.
    pub fn delete_chunks_for(&self, name: &str, document_id: &str) -> RagResult<u64> {
        let dir = self.chunks_dir(name);
        if !dir.is_dir() {
            return Ok(0);
        }
        let prefix = format!("{document_id}_chunk_");
        let mut removed = 0u64;
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned());
            if stem.as_deref().map(|s| s.starts_with(&prefix)).unwrap_or(false) {
                fs::remove_file(path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn load_ordinal_map(&self, name: &str) -> RagResult<OrdinalMap> {
        let path = self.ordinal_map_path(name);
        if !path.is_file() {
            return Ok(OrdinalMap::default());
        }
        let body = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&body)?)
    }

    pub fn save_ordinal_map(&self, name: &str, map: &OrdinalMap) -> RagResult<()> {
        write_json(&self.ordinal_map_path(name), map)
    }

    pub fn delete_index_tree(&self, name: &str) -> RagResult<()> {
        let dir = self.index_dir(name);
        if !dir.is_dir() {
            return Err(RagError::IndexNotFound(name.to_string()));
        }
        fs::remove_dir_all(dir)?;
        Ok(())
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> RagResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = serde_json::to_string_pretty(value)?;
    fs::write(path, body)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AnnBackend, IndexSettings};
    use chrono::Utc;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("ragindex-store-test-{}", uuid::Uuid::new_v4()))
    }

    fn settings() -> IndexSettings {
        IndexSettings {
            backend: AnnBackend::Hnsw,
            embedding_model: "hash-fake".to_string(),
            graph_degree: 32,
            build_complexity: 64,
            chunk_size: 512,
            chunk_overlap: 64,
        }
    }

    #[test]
    fn round_trips_index_metadata() {
        let root = temp_root();
        let store = Store::new(&root).unwrap();
        let meta = IndexMetadata {
            name: "t".to_string(),
            created_at: Utc::now(),
            updated_at: None,
            chunk_count: 0,
            total_characters: 0,
            settings: settings(),
        };
        store.save_index_metadata(&meta).unwrap();
        assert!(store.index_exists("t"));
        let loaded = store.load_index_metadata("t").unwrap();
        assert_eq!(loaded.name, "t");

        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn chunk_enumeration_is_lexicographic() {
        let root = temp_root();
        let store = Store::new(&root).unwrap();
        let meta = IndexMetadata {
            name: "t".to_string(),
            created_at: Utc::now(),
            updated_at: None,
            chunk_count: 0,
            total_characters: 0,
            settings: settings(),
        };
        store.save_index_metadata(&meta).unwrap();

        for id in ["b_chunk_0", "a_chunk_1", "a_chunk_0"] {
            store
                .write_chunk(
                    "t",
                    &crate::types::Chunk {
                        chunk_id: id.to_string(),
                        document_id: "a".to_string(),
                        position: 0,
                        content: "x".to_string(),
                        metadata: None,
                    },
                )
                .unwrap();
        }

        let ids = store.enumerate_chunk_ids("t").unwrap();
        assert_eq!(ids, vec!["a_chunk_0", "a_chunk_1", "b_chunk_0"]);

        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn delete_chunks_for_prefix_matches_document_only() {
        let root = temp_root();
        let store = Store::new(&root).unwrap();
        let meta = IndexMetadata {
            name: "t".to_string(),
            created_at: Utc::now(),
            updated_at: None,
            chunk_count: 0,
            total_characters: 0,
            settings: settings(),
        };
        store.save_index_metadata(&meta).unwrap();

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
        store
            .write_chunk(
                "t",
                &crate::types::Chunk {
                    chunk_id: "doc10_chunk_0".to_string(),
                    document_id: "doc10".to_string(),
                    position: 0,
                    content: "y".to_string(),
                    metadata: None,
                },
            )
            .unwrap();

        let removed = store.delete_chunks_for("t", "doc1").unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.enumerate_chunk_ids("t").unwrap(), vec!["doc10_chunk_0"]);

        fs::remove_dir_all(&root).ok();
    }
}
