use quill_core::{DocumentId, OwnerId, StoreFailure};
use thiserror::Error;

/// Terminal outcome of a persistence operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistError {
    /// Every attempt failed with a transient error or timed out
    #[error("persistence failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
    #[error("document {doc_id} is not owned by {owner}")]
    Ownership { doc_id: DocumentId, owner: OwnerId },
    #[error("document not found: {0}")]
    NotFound(DocumentId),
}

/// Errors surfaced by [`AutoSaveEngine`](crate::AutoSaveEngine).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error(transparent)]
    Store(#[from] StoreFailure),
    #[error("version {0} not found")]
    VersionNotFound(u64),
    #[error("document has not been saved yet")]
    Unsaved,
    #[error("editing session is closed")]
    Closed,
}

/// Errors loading an [`EngineConfig`](crate::EngineConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}
