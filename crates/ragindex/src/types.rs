//! Core data model: index settings, tenants, documents, chunks, and the
//! ordinal↔chunk_id map written at the end of a rebuild.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::{RagError, RagResult};

/// Metadata map attached to a document or chunk. Values are JSON scalars or
/// lists; the filter evaluator is the only consumer that cares about shape.
pub type Metadata = HashMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnBackend {
    Hnsw,
    Diskann,
}

impl Default for AnnBackend {
    fn default() -> Self {
        AnnBackend::Hnsw
    }
}

/// Settings for one index's ANN build. Immutable once a rebuild has run
/// against them; a later rebuild may replace them wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSettings {
    pub backend: AnnBackend,
    pub embedding_model: String,
    pub graph_degree: u32,
    pub build_complexity: u32,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl IndexSettings {
    /// Validates range and cross-field constraints. Called whenever settings
    /// are constructed fresh (index create, rebuild with new settings) —
    /// never only at process-default time.
    pub fn validate(&self) -> RagResult<()> {
        if !(8..=128).contains(&self.graph_degree) {
            return Err(RagError::validation("graph_degree must be in [8,128]"));
        }
        if !(32..=512).contains(&self.build_complexity) {
            return Err(RagError::validation("build_complexity must be in [32,512]"));
        }
        if !(64..=4096).contains(&self.chunk_size) {
            return Err(RagError::validation("chunk_size must be in [64,4096]"));
        }
        if self.chunk_overlap > 512 {
            return Err(RagError::validation("chunk_overlap must be in [0,512]"));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::validation("chunk_overlap must be < chunk_size"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexStatus {
    Empty,
    Ready,
    Building,
}

/// On-disk counters and settings for a tenant. `status` is not stored; it is
/// derived fresh from filesystem state by the registry on every read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub chunk_count: u64,
    pub total_characters: u64,
    pub settings: IndexSettings,
}

/// A tenant snapshot returned to callers, with the derived status attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub chunk_count: u64,
    pub total_characters: u64,
    pub settings: IndexSettings,
    pub status: IndexStatus,
}

/// Statistics computed fresh on `Registry::get`, never cached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStatistics {
    pub total_characters: u64,
    pub avg_chunk_size: f64,
    pub metadata_fields: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    pub metadata: Option<Metadata>,
    pub chunk_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub document_id: String,
    pub position: u32,
    pub content: String,
    pub metadata: Option<Metadata>,
}

impl Chunk {
    pub fn make_id(document_id: &str, position: u32) -> String {
        format!("{document_id}_chunk_{position}")
    }
}

/// Ordered sequence of chunk_ids presented to the ANN builder during the
/// most recent successful rebuild; index `i` corresponds to ANN ordinal `i`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrdinalMap(pub Vec<String>);

impl OrdinalMap {
    pub fn chunk_id_for(&self, ordinal: u64) -> Option<&str> {
        self.0.get(ordinal as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentAddStatus {
    Added,
    Updated,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentAddResult {
    pub id: String,
    pub status: DocumentAddStatus,
    pub chunk_count: u32,
    pub error: Option<String>,
}
