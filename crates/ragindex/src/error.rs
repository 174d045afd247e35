//! Stable error taxonomy shared by every component.
//!
//! Four classes: validation, not-found, conflict, internal. Each carries a
//! stable `code` (mirroring the wire API's `error.code` field) and a
//! human-readable message. Lower layers (`Store`, `Filter`) return `RagError`
//! directly; cross-cutting plumbing elsewhere in the crate still returns
//! `anyhow::Error`, matching the teacher's anyhow-first style.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ValidationError,
    IndexNotFound,
    IndexAlreadyExists,
    DocumentNotFound,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::IndexNotFound => "INDEX_NOT_FOUND",
            ErrorCode::IndexAlreadyExists => "INDEX_ALREADY_EXISTS",
            ErrorCode::DocumentNotFound => "DOCUMENT_NOT_FOUND",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

#[derive(Debug, Error)]
pub enum RagError {
    #[error("{0}")]
    Validation(String),

    #[error("index '{0}' not found")]
    IndexNotFound(String),

    #[error("index '{0}' already exists")]
    IndexAlreadyExists(String),

    #[error("document '{0}' not found")]
    DocumentNotFound(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("internal error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RagError {
    pub fn code(&self) -> ErrorCode {
        match self {
            RagError::Validation(_) => ErrorCode::ValidationError,
            RagError::IndexNotFound(_) => ErrorCode::IndexNotFound,
            RagError::IndexAlreadyExists(_) => ErrorCode::IndexAlreadyExists,
            RagError::DocumentNotFound(_) => ErrorCode::DocumentNotFound,
            RagError::Internal(_) | RagError::Io(_) | RagError::Json(_) => ErrorCode::InternalError,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        RagError::Validation(msg.into())
    }
}

pub type RagResult<T> = Result<T, RagError>;
