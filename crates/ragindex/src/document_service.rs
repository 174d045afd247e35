//! Ingest, update, and delete documents; maintains the chunk set and the
//! registry's running counters as a side-effect of every successful write.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::chunker::TextChunker;
use crate::error::{RagError, RagResult};
use crate::filter::Filter;
use crate::registry::Registry;
use crate::storage::Store;
use crate::types::{Chunk, Document, DocumentAddResult, DocumentAddStatus, Metadata};

pub struct DocumentInput {
    pub id: Option<String>,
    pub content: String,
    pub metadata: Option<Metadata>,
}

pub struct AddOptions {
    pub chunk_size: Option<usize>,
    pub chunk_overlap: Option<usize>,
    pub update_if_exists: bool,
}

pub struct DocumentService {
    store: Arc<Store>,
    registry: Arc<Registry>,
}

impl DocumentService {
    pub fn new(store: Arc<Store>, registry: Arc<Registry>) -> Self {
        Self { store, registry }
    }

    /// Per-document outcomes are emitted in input order; the registry's
    /// counters are updated once, after the whole batch completes.
    pub fn add_documents(
        &self,
        index: &str,
        docs: Vec<DocumentInput>,
        opts: &AddOptions,
    ) -> RagResult<Vec<DocumentAddResult>> {
        let meta = self.store.load_index_metadata(index)?;
        let chunk_size = opts.chunk_size.unwrap_or(meta.settings.chunk_size);
        let chunk_overlap = opts.chunk_overlap.unwrap_or(meta.settings.chunk_overlap);
        let chunker = TextChunker::new(chunk_size, chunk_overlap);

        let mut results = Vec::with_capacity(docs.len());
        let mut delta_chunks: i64 = 0;
        let mut delta_characters: i64 = 0;

        for input in docs {
            let id = input.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let existing = self.store.load_document(index, &id).ok();

            if existing.is_some() && !opts.update_if_exists {
                results.push(DocumentAddResult {
                    id,
                    status: DocumentAddStatus::Failed,
                    chunk_count: 0,
                    error: Some("Document already exists".to_string()),
                });
                continue;
            }

            let pieces = chunker.chunk(&input.content);
            if let Some(prior) = &existing {
                delta_chunks -= prior.chunk_count as i64;
                delta_characters -= prior.content.chars().count() as i64;
                self.store.delete_chunks_for(index, &id)?;
            }

            for (position, text) in pieces.iter().enumerate() {
                let chunk = Chunk {
                    chunk_id: Chunk::make_id(&id, position as u32),
                    document_id: id.clone(),
                    position: position as u32,
                    content: text.clone(),
                    metadata: input.metadata.clone(),
                };
                self.store.write_chunk(index, &chunk)?;
            }

            let now = Utc::now();
            let document = Document {
                id: id.clone(),
                content: input.content.clone(),
                metadata: input.metadata.clone(),
                chunk_count: pieces.len() as u32,
                created_at: existing.as_ref().map(|d| d.created_at).unwrap_or(now),
                updated_at: existing.as_ref().map(|_| now),
            };
            self.store.save_document(index, &document)?;

            delta_chunks += pieces.len() as i64;
            delta_characters += input.content.chars().count() as i64;

            results.push(DocumentAddResult {
                id,
                status: if existing.is_some() {
                    DocumentAddStatus::Updated
                } else {
                    DocumentAddStatus::Added
                },
                chunk_count: pieces.len() as u32,
                error: None,
            });
        }

        self.registry
            .update_counters(index, delta_chunks, delta_characters)?;

        Ok(results)
    }

    /// Reassembles a document with its chunks in `position` order. A missing
    /// chunk file is skipped rather than failing the read.
    pub fn get_document(&self, index: &str, id: &str) -> RagResult<(Document, Vec<Chunk>)> {
        let document = self.store.load_document(index, id)?;
        let mut chunks = Vec::with_capacity(document.chunk_count as usize);
        for position in 0..document.chunk_count {
            let chunk_id = Chunk::make_id(id, position);
            if let Ok(chunk) = self.store.load_chunk(index, &chunk_id) {
                chunks.push(chunk);
            }
        }
        Ok((document, chunks))
    }

    pub fn update_document(
        &self,
        index: &str,
        id: &str,
        content: Option<String>,
        metadata: Option<Metadata>,
        merge_metadata: bool,
    ) -> RagResult<Document> {
        let meta = self.store.load_index_metadata(index)?;
        let mut document = self.store.load_document(index, id)?;

        let new_metadata = merge_metadata_maps(document.metadata.clone(), metadata, merge_metadata);

        if let Some(new_content) = content {
            let delta_chars =
                new_content.chars().count() as i64 - document.content.chars().count() as i64;
            let old_chunk_count = document.chunk_count as i64;

            self.store.delete_chunks_for(index, id)?;
            let chunker = TextChunker::new(meta.settings.chunk_size, meta.settings.chunk_overlap);
            let pieces = chunker.chunk(&new_content);
            for (position, text) in pieces.iter().enumerate() {
                let chunk = Chunk {
                    chunk_id: Chunk::make_id(id, position as u32),
                    document_id: id.to_string(),
                    position: position as u32,
                    content: text.clone(),
                    metadata: new_metadata.clone(),
                };
                self.store.write_chunk(index, &chunk)?;
            }

            document.content = new_content;
            document.chunk_count = pieces.len() as u32;
            document.metadata = new_metadata;
            document.updated_at = Some(Utc::now());
            self.store.save_document(index, &document)?;

            self.registry.update_counters(
                index,
                pieces.len() as i64 - old_chunk_count,
                delta_chars,
            )?;
        } else {
            self.rewrite_chunk_metadata(index, id, &new_metadata, document.chunk_count)?;
            document.metadata = new_metadata;
            document.updated_at = Some(Utc::now());
            self.store.save_document(index, &document)?;
        }

        Ok(document)
    }

    /// Never rechunks; rewrites the metadata snapshot on every chunk and
    /// returns the effective post-merge map.
    pub fn update_metadata_only(
        &self,
        index: &str,
        id: &str,
        metadata: Metadata,
        merge: bool,
    ) -> RagResult<Metadata> {
        let mut document = self.store.load_document(index, id)?;
        let new_metadata = merge_metadata_maps(document.metadata.clone(), Some(metadata), merge)
            .unwrap_or_default();

        self.rewrite_chunk_metadata(index, id, &Some(new_metadata.clone()), document.chunk_count)?;
        document.metadata = Some(new_metadata.clone());
        document.updated_at = Some(Utc::now());
        self.store.save_document(index, &document)?;

        Ok(new_metadata)
    }

    fn rewrite_chunk_metadata(
        &self,
        index: &str,
        id: &str,
        metadata: &Option<Metadata>,
        chunk_count: u32,
    ) -> RagResult<()> {
        for position in 0..chunk_count {
            let chunk_id = Chunk::make_id(id, position);
            if let Ok(mut chunk) = self.store.load_chunk(index, &chunk_id) {
                chunk.metadata = metadata.clone();
                self.store.write_chunk(index, &chunk)?;
            }
        }
        Ok(())
    }

    pub fn delete_document(&self, index: &str, id: &str) -> RagResult<()> {
        let document = self.store.load_document(index, id)?;
        self.store.delete_chunks_for(index, id)?;
        self.store.delete_document(index, id)?;
        self.registry.update_counters(
            index,
            -(document.chunk_count as i64),
            -(document.content.chars().count() as i64),
        )?;
        Ok(())
    }

    /// `document_ids` takes precedence over `metadata_filter` when both are
    /// given. At least one must be non-empty.
    pub fn bulk_delete(
        &self,
        index: &str,
        document_ids: Option<Vec<String>>,
        metadata_filter: Option<std::collections::HashMap<String, Value>>,
    ) -> RagResult<u64> {
        let ids: Vec<String> = if let Some(ids) = document_ids.filter(|v| !v.is_empty()) {
            ids
        } else if let Some(filter_raw) = metadata_filter {
            let filter = Filter::parse(&filter_raw)?;
            self.store
                .enumerate_documents(index)?
                .into_iter()
                .filter(|d| filter.matches(d.metadata.as_ref().unwrap_or(&Metadata::new())))
                .map(|d| d.id)
                .collect()
        } else {
            return Err(RagError::validation(
                "bulk_delete requires document_ids or metadata_filter",
            ));
        };

        let mut deleted = 0u64;
        for id in ids {
            if self.delete_document(index, &id).is_ok() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

/// Shallow merge: when `merge` is true and a prior map exists, new keys
/// override old keys and untouched keys survive; otherwise the new map
/// replaces the prior one whole.
fn merge_metadata_maps(
    prior: Option<Metadata>,
    new: Option<Metadata>,
    merge: bool,
) -> Option<Metadata> {
    match (prior, new, merge) {
        (Some(mut prior), Some(new), true) => {
            prior.extend(new);
            Some(prior)
        }
        (None, Some(new), true) => Some(new),
        (_, new, false) => new,
        (prior, None, true) => prior,
    }
}
