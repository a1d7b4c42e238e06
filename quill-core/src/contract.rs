//! Collaborator contracts consumed by the auto-save engine.
//!
//! Every outside dependency is injected as an `Arc<dyn …>` of one of these
//! traits: the document store (usually remote), the local pattern and draft
//! stores, and an optional title generator.

use async_trait::async_trait;
use thiserror::Error;

use crate::document::{DocumentFields, DocumentId, OwnerId, VersionDraft, VersionSnapshot};
use crate::pattern::{EditingPattern, PatternKey};

/// Failure reported by a store implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreFailure {
    /// Network, timeout or backend hiccup; safe to retry
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("document not found: {0}")]
    NotFound(DocumentId),
    #[error("document {doc_id} is not owned by {owner}")]
    NotOwned { doc_id: DocumentId, owner: OwnerId },
}

impl StoreFailure {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreFailure::Unavailable(_))
    }
}

/// Remote document store.
///
/// Updates after an ambiguous failure are assumed safe to repeat.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create a document and return its new id.
    async fn create(&self, owner: OwnerId, fields: DocumentFields) -> Result<DocumentId, StoreFailure>;

    /// Owner of a document, or `None` if it does not exist.
    async fn owner_of(&self, doc_id: DocumentId) -> Result<Option<OwnerId>, StoreFailure>;

    /// Overwrite a document's fields. Fails on not-found or not-owned.
    async fn update(
        &self,
        owner: OwnerId,
        doc_id: DocumentId,
        fields: DocumentFields,
    ) -> Result<(), StoreFailure>;

    /// Append an immutable version snapshot and return its number.
    async fn create_version(
        &self,
        owner: OwnerId,
        doc_id: DocumentId,
        draft: VersionDraft,
    ) -> Result<u64, StoreFailure>;

    async fn load_version(
        &self,
        doc_id: DocumentId,
        version: u64,
    ) -> Result<Option<VersionSnapshot>, StoreFailure>;

    /// All snapshots of a document in version order.
    async fn list_versions(&self, doc_id: DocumentId) -> Result<Vec<VersionSnapshot>, StoreFailure>;
}

/// Durable home of learned editing patterns.
pub trait PatternStore: Send + Sync {
    fn load_pattern(&self, key: &PatternKey) -> Result<Option<EditingPattern>, StoreFailure>;
    fn save_pattern(&self, key: &PatternKey, pattern: &EditingPattern) -> Result<(), StoreFailure>;
}

/// Local journal for content that could not be persisted.
///
/// Drafts are keyed by owner plus document; a never-saved document uses `None`.
pub trait DraftStore: Send + Sync {
    fn save_draft(
        &self,
        owner: OwnerId,
        doc_id: Option<DocumentId>,
        content: &str,
    ) -> Result<(), StoreFailure>;
    fn load_draft(&self, owner: OwnerId, doc_id: Option<DocumentId>) -> Result<Option<String>, StoreFailure>;
    fn clear_draft(&self, owner: OwnerId, doc_id: Option<DocumentId>) -> Result<(), StoreFailure>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TitleError {
    #[error("title generation failed: {0}")]
    Failed(String),
    #[error("title generator returned an empty title")]
    Empty,
}

/// Produces a title from a document's plain text.
#[async_trait]
pub trait TitleGenerator: Send + Sync {
    async fn generate_title(&self, plain_text: &str) -> Result<String, TitleError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_transient_classification() {
        assert!(StoreFailure::Unavailable("reset".into()).is_transient());
        assert!(!StoreFailure::NotFound(Uuid::nil()).is_transient());
        assert!(!StoreFailure::NotOwned {
            doc_id: Uuid::nil(),
            owner: Uuid::nil()
        }
        .is_transient());
    }

    #[test]
    fn test_failure_display() {
        let err = StoreFailure::NotFound(Uuid::nil());
        assert!(err.to_string().contains("not found"));
        assert!(TitleError::Empty.to_string().contains("empty"));
    }
}
