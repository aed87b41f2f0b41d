//! Error types shared across the ingestion pipeline.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, IngestError>;

/// Errors surfaced by stores, the group registry and the ingestor.
///
/// Calculation anomalies are not errors: they are classified into
/// [`crate::SignalTag`]s and recorded on the task document instead.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("serialization failed: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("store lock failed: {0}")]
    Lock(String),

    #[error("store at {path:?} is not usable: {reason}")]
    StoreUnavailable { path: PathBuf, reason: String },

    #[error("counter '{name}' could not be advanced: {reason}")]
    IdAllocation { name: String, reason: String },

    #[error("structure group {group_id} not found")]
    GroupNotFound { group_id: u64 },

    #[error("structure group {group_id} kept changing under concurrent writers ({attempts} attempts)")]
    Contention { group_id: u64, attempts: usize },

    #[error("invalid document: {reason}")]
    InvalidDocument { reason: String },

    #[error("invalid provenance sidecar {path:?}: {reason}")]
    InvalidSidecar { path: PathBuf, reason: String },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("enrichment step '{step}' failed: {reason}")]
    Enrichment { step: String, reason: String },
}

impl IngestError {
    pub(crate) fn invalid_document(reason: impl Into<String>) -> Self {
        Self::InvalidDocument {
            reason: reason.into(),
        }
    }

    pub(crate) fn enrichment(step: impl Into<String>, reason: impl ToString) -> Self {
        Self::Enrichment {
            step: step.into(),
            reason: reason.to_string(),
        }
    }
}
