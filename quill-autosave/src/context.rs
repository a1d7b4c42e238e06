//! State shared by the save scheduler and the version manager.

use quill_core::{DocumentId, OwnerId};
use tokio::sync::{Mutex, MutexGuard, RwLock};

use crate::persistence::PersistenceClient;

#[derive(Debug, Default)]
struct Identity {
    doc_id: Option<DocumentId>,
    title: Option<String>,
}

/// One editor's document identity plus the write gate.
///
/// Every store write for the document (document update or version
/// snapshot) happens while holding [`DocumentContext::lock_writes`], so at
/// most one write is in flight per document.
pub(crate) struct DocumentContext {
    pub(crate) owner: OwnerId,
    pub(crate) client: PersistenceClient,
    write_gate: Mutex<()>,
    identity: RwLock<Identity>,
}

impl DocumentContext {
    pub(crate) fn new(
        owner: OwnerId,
        client: PersistenceClient,
        doc_id: Option<DocumentId>,
        title: Option<String>,
    ) -> Self {
        Self {
            owner,
            client,
            write_gate: Mutex::new(()),
            identity: RwLock::new(Identity { doc_id, title }),
        }
    }

    pub(crate) async fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_gate.lock().await
    }

    pub(crate) async fn doc_id(&self) -> Option<DocumentId> {
        self.identity.read().await.doc_id
    }

    pub(crate) async fn set_doc_id(&self, doc_id: DocumentId) {
        self.identity.write().await.doc_id = Some(doc_id);
    }

    pub(crate) async fn title(&self) -> Option<String> {
        self.identity.read().await.title.clone()
    }

    pub(crate) async fn set_title(&self, title: impl Into<String>) {
        self.identity.write().await.title = Some(title.into());
    }

    /// Swap the title, returning the previous one.
    pub(crate) async fn replace_title(&self, title: Option<String>) -> Option<String> {
        std::mem::replace(&mut self.identity.write().await.title, title)
    }
}
