//! Multi-tenant vector-search core: chunking, filesystem-backed persistence,
//! tenant lifecycle, document ingest, and semantic/grep/hybrid/batch search.
//!
//! The HTTP surface, file-format text extraction, and process bootstrap are
//! external collaborators built on top of this crate, not part of it.

pub mod ann;
pub mod chunker;
pub mod config;
pub mod document_service;
pub mod embedder;
pub mod error;
pub mod filter;
pub mod registry;
pub mod searcher;
pub mod storage;
pub mod types;

pub use config::RAGConfig;
pub use document_service::DocumentService;
pub use error::{ErrorCode, RagError, RagResult};
pub use registry::Registry;
pub use searcher::Searcher;
pub use storage::Store;
