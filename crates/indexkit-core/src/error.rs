use std::fmt;

use thiserror::Error;

use crate::events::EventKind;

/// Failures a search backend reports from one of its four operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ServiceError {
    /// Backend unreachable; the caller may retry.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Malformed field data; the document must be skipped or the run aborted.
    #[error("Invalid document '{document_id}': {reason}")]
    InvalidDocument { document_id: String, reason: String },

    /// Search or delete against an index that does not exist.
    #[error("Index not found: {0}")]
    IndexNotFound(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl ServiceError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    pub fn invalid_document(document_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDocument { document_id: document_id.into(), reason: reason.into() }
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ServiceUnavailable(_))
    }
}

/// The pipeline step a service failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    CreateIndex,
    BuildDocument,
    IndexDocument,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::CreateIndex => "create_index",
            Phase::BuildDocument => "build_document",
            Phase::IndexDocument => "index_document",
        };
        f.write_str(s)
    }
}

/// A handler failed while an event was being dispatched.
#[derive(Debug, Error)]
#[error("handler '{handler}' failed on {event} (document: {}): {source}", .document_id.as_deref().unwrap_or("-"))]
pub struct EventError {
    pub event: EventKind,
    pub handler: String,
    pub document_id: Option<String>,
    #[source]
    pub source: anyhow::Error,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{phase} failed for collection '{collection}' (document: {}): {source}", .document_id.as_deref().unwrap_or("-"))]
    Service {
        phase: Phase,
        collection: String,
        document_id: Option<String>,
        #[source]
        source: ServiceError,
    },

    #[error(transparent)]
    Handler(#[from] EventError),

    #[error("Collection '{collection}' could not be read: {source}")]
    Collection {
        collection: String,
        #[source]
        source: anyhow::Error,
    },
}

impl PipelineError {
    /// Id of the document the failure is attributed to, if any.
    pub fn document_id(&self) -> Option<&str> {
        match self {
            PipelineError::Service { document_id, .. } => document_id.as_deref(),
            PipelineError::Handler(e) => e.document_id.as_deref(),
            PipelineError::Collection { .. } => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
