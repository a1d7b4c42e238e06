//! Engine façade: one [`AutoSaveEngine`] per open editor.
//!
//! ```text
//! editor ──report_change──► SaveScheduler ──► PersistenceClient ──► DocumentStore
//!                 │               │  ▲
//!                 │               ▼  │ write gate
//!                 └────────► VersionManager
//! ```

use quill_core::{
    DocumentId, DocumentStore, DraftStore, EditingPattern, IntervalPolicy, LearnerConfig,
    OwnerId, PatternScope, PatternStore, SaveMode, TitleGenerator, VersionSnapshot,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::context::DocumentContext;
use crate::error::{ConfigError, EngineError};
use crate::persistence::{PersistStats, PersistenceClient, RetryConfig};
use crate::scheduler::{SavePhase, SaveScheduler, SchedulerParts};
use crate::tracker::PatternTracker;
use crate::versioning::{VersionConfig, VersionManager};

/// Engine configuration. Every field has a default; partial JSON is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub initial_mode: SaveMode,
    pub pattern_scope: PatternScope,
    /// Perform a final save on close when changes are pending (default: true)
    pub flush_on_close: bool,
    pub placeholder_title: String,
    pub interval: IntervalPolicy,
    pub learner: LearnerConfig,
    pub retry: RetryConfig,
    pub versioning: VersionConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_mode: SaveMode::Adaptive,
            pattern_scope: PatternScope::PerDocument,
            flush_on_close: true,
            placeholder_title: "Untitled".to_string(),
            interval: IntervalPolicy::default(),
            learner: LearnerConfig::default(),
            retry: RetryConfig::default(),
            versioning: VersionConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

/// Collaborators injected into the engine.
#[derive(Clone)]
pub struct EngineDeps {
    pub documents: Arc<dyn DocumentStore>,
    pub patterns: Arc<dyn PatternStore>,
    pub drafts: Option<Arc<dyn DraftStore>>,
    pub titles: Option<Arc<dyn TitleGenerator>>,
}

impl EngineDeps {
    pub fn new(documents: Arc<dyn DocumentStore>, patterns: Arc<dyn PatternStore>) -> Self {
        Self {
            documents,
            patterns,
            drafts: None,
            titles: None,
        }
    }

    /// Use one store for documents, patterns and drafts.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: DocumentStore + PatternStore + DraftStore + 'static,
    {
        Self {
            documents: store.clone(),
            patterns: store.clone(),
            drafts: Some(store),
            titles: None,
        }
    }

    pub fn with_drafts(mut self, drafts: Arc<dyn DraftStore>) -> Self {
        self.drafts = Some(drafts);
        self
    }

    pub fn with_titles(mut self, titles: Arc<dyn TitleGenerator>) -> Self {
        self.titles = Some(titles);
        self
    }
}

/// What the editor has open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenDocument {
    /// `None` for a document that has never been saved
    pub doc_id: Option<DocumentId>,
    /// User-provided title, if any
    pub title: Option<String>,
    /// Content as currently stored
    pub content: String,
}

impl OpenDocument {
    pub fn new_untitled() -> Self {
        Self::default()
    }

    pub fn existing(doc_id: DocumentId, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            doc_id: Some(doc_id),
            title: Some(title.into()),
            content: content.into(),
        }
    }
}

/// Auto-save engine for one open document.
///
/// Must be created inside a tokio runtime. Dropping the engine aborts its
/// timers; call [`close`](Self::close) to flush pending changes first.
pub struct AutoSaveEngine {
    ctx: Arc<DocumentContext>,
    scheduler: Arc<SaveScheduler>,
    versions: Arc<VersionManager>,
    drafts: Option<Arc<dyn DraftStore>>,
    flush_on_close: bool,
}

impl AutoSaveEngine {
    pub fn open(owner: OwnerId, document: OpenDocument, deps: EngineDeps, config: EngineConfig) -> Self {
        let client = PersistenceClient::new(deps.documents, config.retry);
        let ctx = Arc::new(DocumentContext::new(
            owner,
            client,
            document.doc_id,
            document.title.clone(),
        ));

        let title = document
            .title
            .as_deref()
            .unwrap_or(&config.placeholder_title);
        let versions = VersionManager::new(
            ctx.clone(),
            config.versioning,
            &document.content,
            title,
            config.initial_mode == SaveMode::Manual,
        );

        let tracker = PatternTracker::open(
            deps.patterns,
            config.pattern_scope,
            owner,
            document.doc_id,
            &document.content,
            config.learner,
            tokio::time::Instant::now().into_std(),
        );

        let scheduler = SaveScheduler::new(
            SchedulerParts {
                ctx: ctx.clone(),
                versions: versions.clone(),
                drafts: deps.drafts.clone(),
                titles: deps.titles,
                policy: config.interval,
                placeholder_title: config.placeholder_title,
                mode: config.initial_mode,
                tracker,
            },
            document.content,
        );

        match document.doc_id {
            Some(id) => log::info!("session opened for {id} ({} mode)", config.initial_mode),
            None => log::info!("session opened for a new document ({} mode)", config.initial_mode),
        }

        Self {
            ctx,
            scheduler,
            versions,
            drafts: deps.drafts,
            flush_on_close: config.flush_on_close,
        }
    }

    /// Report the editor's current content.
    pub async fn report_change(&self, content: impl Into<String>) -> Result<(), EngineError> {
        self.scheduler.report_change(content.into()).await
    }

    /// Save now, regardless of mode and pending timers.
    ///
    /// A successful save also writes a manual version snapshot; a failing
    /// snapshot does not fail the save.
    pub async fn force_save(&self) -> Result<(), EngineError> {
        self.scheduler.force_save().await
    }

    pub async fn set_mode(&self, mode: SaveMode) {
        self.scheduler.set_mode(mode).await;
    }

    pub async fn has_unsaved_changes(&self) -> bool {
        self.scheduler.has_unsaved_changes().await
    }

    pub async fn last_saved_at(&self) -> Option<SystemTime> {
        self.scheduler.last_saved_at().await
    }

    /// Interval the next scheduled save would use; `None` in manual mode.
    pub async fn current_interval(&self) -> Option<Duration> {
        self.scheduler.current_interval().await
    }

    pub async fn mode(&self) -> SaveMode {
        self.scheduler.mode().await
    }

    pub async fn save_phase(&self) -> SavePhase {
        self.scheduler.phase().await
    }

    pub async fn document_id(&self) -> Option<DocumentId> {
        self.ctx.doc_id().await
    }

    pub async fn title(&self) -> Option<String> {
        self.ctx.title().await
    }

    pub async fn pattern(&self) -> EditingPattern {
        self.scheduler.pattern().await
    }

    pub async fn has_pending_timer(&self) -> bool {
        self.scheduler.has_pending_timer().await
    }

    pub async fn has_pending_version_timer(&self) -> bool {
        self.versions.has_pending_timer().await
    }

    /// Characters of drift since the last version snapshot.
    pub async fn unversioned_chars(&self) -> usize {
        self.versions.pending_drift().await
    }

    pub fn stats(&self) -> PersistStats {
        self.ctx.client.stats()
    }

    /// Unsaved content journaled by an earlier session, if any.
    pub async fn recover_draft(&self) -> Result<Option<String>, EngineError> {
        let Some(drafts) = &self.drafts else {
            return Ok(None);
        };
        let doc_id = self.ctx.doc_id().await;
        Ok(drafts.load_draft(self.ctx.owner, doc_id)?)
    }

    pub async fn discard_draft(&self) -> Result<(), EngineError> {
        let Some(drafts) = &self.drafts else {
            return Ok(());
        };
        let doc_id = self.ctx.doc_id().await;
        Ok(drafts.clear_draft(self.ctx.owner, doc_id)?)
    }

    pub async fn list_versions(&self) -> Result<Vec<VersionSnapshot>, EngineError> {
        let doc_id = self.ctx.doc_id().await.ok_or(EngineError::Unsaved)?;
        Ok(self.ctx.client.list_versions(doc_id).await?)
    }

    /// Write a version's title and content back into the live document.
    ///
    /// On failure the session keeps its previous content and title.
    pub async fn restore_version(&self, version: u64) -> Result<VersionSnapshot, EngineError> {
        if self.scheduler.is_closed().await {
            return Err(EngineError::Closed);
        }
        let doc_id = self.ctx.doc_id().await.ok_or(EngineError::Unsaved)?;
        let snapshot = self
            .ctx
            .client
            .load_version(doc_id, version)
            .await?
            .ok_or(EngineError::VersionNotFound(version))?;

        self.scheduler
            .replace_content(snapshot.content.clone(), snapshot.title.clone())
            .await?;
        self.versions.reset_baseline(&snapshot.content).await;
        log::info!("restored version {version} of {doc_id}");
        Ok(snapshot)
    }

    /// End the session: cancel timers, flush pending changes and learn from the session.
    ///
    /// Idempotent. Returns the error of the final save, if it failed.
    pub async fn close(&self) -> Result<(), EngineError> {
        let result = self.scheduler.close(self.flush_on_close).await;
        log::info!("session closed");
        result
    }
}
