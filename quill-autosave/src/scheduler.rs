//! Save scheduler: the per-document save state machine.
//!
//! ```text
//!   Clean ──change──► DirtyPending ──timer / force──► Saving ──ok──► Saved
//!                          ▲                            │
//!                          │                            └──err──► ErrorBackoff
//!                          └──────── re-arm (non-manual) ─────────────┘
//! ```
//!
//! Every change cancels and re-arms the single save timer. The save itself
//! runs under the document's write gate; changes that arrive while a save is
//! in flight are picked up when it completes.
//!
//! Lock order: write gate, then scheduler state, then version manager state.

use quill_core::{
    compute_interval, DocumentFields, DocumentId, DraftStore, EditingPattern, IntervalPolicy,
    SaveMode, TitleGenerator,
};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::context::DocumentContext;
use crate::error::{EngineError, PersistError};
use crate::timer::TimerSlot;
use crate::title;
use crate::tracker::PatternTracker;
use crate::versioning::VersionManager;

/// Observable state of the save state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavePhase {
    /// No changes since the session opened
    Clean,
    /// Unsaved changes; a save is scheduled unless the mode is manual
    DirtyPending,
    Saving,
    /// Everything reported so far has been saved
    Saved,
    /// The last save failed and the mode is manual, or the failure is permanent
    ErrorBackoff,
}

impl fmt::Display for SavePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SavePhase::Clean => "clean",
            SavePhase::DirtyPending => "dirty",
            SavePhase::Saving => "saving",
            SavePhase::Saved => "saved",
            SavePhase::ErrorBackoff => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SaveTrigger {
    Timer,
    Manual,
    Restore,
    Close,
}

struct SaveState {
    mode: SaveMode,
    phase: SavePhase,
    latest: String,
    last_saved: String,
    dirty: bool,
    last_saved_at: Option<SystemTime>,
    last_save_instant: Option<Instant>,
    tracker: PatternTracker,
    timer: TimerSlot,
    closed: bool,
}

impl SaveState {
    fn settled_phase(&self) -> SavePhase {
        if self.last_saved_at.is_some() {
            SavePhase::Saved
        } else {
            SavePhase::Clean
        }
    }
}

/// Restore-only state: what a restore swapped out, put back if its save fails.
struct Rollback {
    content: String,
    title: Option<String>,
}

pub(crate) struct SchedulerParts {
    pub ctx: Arc<DocumentContext>,
    pub versions: Arc<VersionManager>,
    pub drafts: Option<Arc<dyn DraftStore>>,
    pub titles: Option<Arc<dyn TitleGenerator>>,
    pub policy: IntervalPolicy,
    pub placeholder_title: String,
    pub mode: SaveMode,
    pub tracker: PatternTracker,
}

pub(crate) struct SaveScheduler {
    ctx: Arc<DocumentContext>,
    versions: Arc<VersionManager>,
    drafts: Option<Arc<dyn DraftStore>>,
    titles: Option<Arc<dyn TitleGenerator>>,
    policy: IntervalPolicy,
    placeholder_title: String,
    state: Mutex<SaveState>,
}

impl SaveScheduler {
    pub(crate) fn new(parts: SchedulerParts, initial_content: String) -> Arc<Self> {
        Arc::new(Self {
            ctx: parts.ctx,
            versions: parts.versions,
            drafts: parts.drafts,
            titles: parts.titles,
            policy: parts.policy,
            placeholder_title: parts.placeholder_title,
            state: Mutex::new(SaveState {
                mode: parts.mode,
                phase: SavePhase::Clean,
                last_saved: initial_content.clone(),
                latest: initial_content,
                dirty: false,
                last_saved_at: None,
                last_save_instant: None,
                tracker: parts.tracker,
                timer: TimerSlot::new("save"),
                closed: false,
            }),
        })
    }

    pub(crate) async fn report_change(self: &Arc<Self>, content: String) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(EngineError::Closed);
        }
        if content == state.latest {
            return Ok(());
        }

        state.tracker.observe(&content, Instant::now().into_std());
        self.versions.note_change(&content).await;
        state.latest = content;

        if state.latest == state.last_saved {
            // Edited back to what is already stored.
            state.dirty = false;
            state.timer.cancel();
            if state.phase != SavePhase::Saving {
                state.phase = state.settled_phase();
            }
            return Ok(());
        }

        state.dirty = true;
        if state.phase != SavePhase::Saving {
            self.schedule_locked(&mut state);
        }
        Ok(())
    }

    pub(crate) async fn force_save(self: &Arc<Self>) -> Result<(), EngineError> {
        self.run_save(SaveTrigger::Manual, None).await
    }

    /// Replace title and content wholesale and save them immediately.
    ///
    /// If the save fails, the previous content and title are put back.
    pub(crate) async fn replace_content(
        self: &Arc<Self>,
        content: String,
        title: String,
    ) -> Result<(), EngineError> {
        self.run_save(SaveTrigger::Restore, Some((content, title))).await
    }

    pub(crate) async fn set_mode(self: &Arc<Self>, mode: SaveMode) {
        let mut state = self.state.lock().await;
        if state.mode == mode {
            return;
        }
        log::info!("save mode {} -> {mode}", state.mode);
        state.mode = mode;
        if state.closed {
            return;
        }
        self.versions.set_paused(mode == SaveMode::Manual).await;
        if mode == SaveMode::Manual {
            state.timer.cancel();
        } else if state.dirty && state.phase != SavePhase::Saving {
            self.schedule_locked(&mut state);
        }
    }

    /// Stop scheduling, flush if asked to, and fold the session into the pattern.
    pub(crate) async fn close(self: &Arc<Self>, flush: bool) -> Result<(), EngineError> {
        let flush = {
            let mut state = self.state.lock().await;
            if state.closed {
                return Ok(());
            }
            state.closed = true;
            state.timer.cancel();
            flush && state.dirty && state.mode != SaveMode::Manual
        };
        self.versions.close().await;

        let result = if flush {
            self.run_save(SaveTrigger::Close, None).await
        } else {
            // Wait for any in-flight write.
            drop(self.ctx.lock_writes().await);
            Ok(())
        };

        let mut state = self.state.lock().await;
        state.timer.cancel();
        state.tracker.finish(Instant::now().into_std());
        result
    }

    fn schedule_locked(self: &Arc<Self>, state: &mut SaveState) {
        state.phase = SavePhase::DirtyPending;
        let Some(delay) = compute_interval(state.mode, state.tracker.pattern(), &self.policy) else {
            state.timer.cancel();
            return;
        };

        let weak = Arc::downgrade(self);
        state.timer.arm(delay, move |generation| async move {
            if let Some(scheduler) = weak.upgrade() {
                scheduler.on_timer(generation).await;
            }
        });
        log::debug!("save scheduled in {}ms ({} mode)", delay.as_millis(), state.mode);
    }

    async fn on_timer(self: Arc<Self>, generation: u64) {
        {
            let mut state = self.state.lock().await;
            if !state.timer.claim(generation) {
                return;
            }
        }
        // Failures are logged and re-armed inside run_save.
        let _ = self.run_save(SaveTrigger::Timer, None).await;
    }

    async fn run_save(
        self: &Arc<Self>,
        trigger: SaveTrigger,
        replacement: Option<(String, String)>,
    ) -> Result<(), EngineError> {
        let _gate = self.ctx.lock_writes().await;

        let (content, gap, replaced) = {
            let mut state = self.state.lock().await;
            match trigger {
                SaveTrigger::Timer => {
                    if state.closed || !state.dirty || state.mode == SaveMode::Manual {
                        return Ok(());
                    }
                }
                SaveTrigger::Close => {
                    if !state.dirty {
                        return Ok(());
                    }
                }
                SaveTrigger::Manual | SaveTrigger::Restore => {
                    if state.closed {
                        return Err(EngineError::Closed);
                    }
                }
            }
            let replaced = replacement
                .map(|(content, title)| (std::mem::replace(&mut state.latest, content), title));
            state.timer.cancel();
            state.phase = SavePhase::Saving;
            let gap = state.last_save_instant.map(|at| at.elapsed());
            (state.latest.clone(), gap, replaced)
        };
        let rollback = match replaced {
            Some((content, title)) => Some(Rollback {
                content,
                title: self.ctx.replace_title(Some(title)).await,
            }),
            None => None,
        };

        let mut fields = DocumentFields::new(String::new(), content.as_str());
        fields.title = self.resolve_title(&fields.plain_text).await;
        let doc_id = self.ctx.doc_id().await;

        match self.ctx.client.save(self.ctx.owner, doc_id, &fields).await {
            Ok(id) => {
                self.on_saved(trigger, doc_id, id, &fields, content, gap).await;
                Ok(())
            }
            Err(e) => {
                self.on_failed(trigger, doc_id, &e, &content, rollback).await;
                Err(e.into())
            }
        }
    }

    async fn on_saved(
        self: &Arc<Self>,
        trigger: SaveTrigger,
        previous_id: Option<DocumentId>,
        id: DocumentId,
        fields: &DocumentFields,
        content: String,
        gap: Option<Duration>,
    ) {
        if previous_id.is_none() {
            self.ctx.set_doc_id(id).await;
            log::info!("document {id} created");
        }
        self.clear_journal(previous_id);
        if trigger == SaveTrigger::Manual {
            self.versions.snapshot_locked(id, &fields.title, &content).await;
        }
        self.versions.note_saved(&fields.title).await;

        let mut state = self.state.lock().await;
        if previous_id.is_none() {
            state.tracker.rekey(id);
        }
        if trigger == SaveTrigger::Manual {
            state.tracker.record_forced_save(gap);
        }
        log::info!(
            "{trigger:?} save of {id} complete ({} chars)",
            quill_core::char_count(&content)
        );
        state.last_saved = content;
        state.last_saved_at = Some(SystemTime::now());
        state.last_save_instant = Some(Instant::now());
        state.dirty = state.latest != state.last_saved;

        if !state.dirty {
            state.phase = SavePhase::Saved;
        } else if state.closed {
            state.phase = SavePhase::DirtyPending;
        } else {
            self.schedule_locked(&mut state);
        }
    }

    async fn on_failed(
        self: &Arc<Self>,
        trigger: SaveTrigger,
        doc_id: Option<DocumentId>,
        error: &PersistError,
        sent: &str,
        rollback: Option<Rollback>,
    ) {
        let mut state = self.state.lock().await;
        log::error!("{trigger:?} save failed: {error}");
        if let Some(rollback) = rollback {
            // Content reported during the save wins over the pre-restore content.
            if state.latest == sent {
                state.latest = rollback.content;
            }
            self.ctx.replace_title(rollback.title).await;
            log::warn!("restore rolled back");
        }
        state.dirty = state.latest != state.last_saved;
        state.phase = SavePhase::ErrorBackoff;
        if !state.dirty {
            state.phase = state.settled_phase();
            return;
        }

        self.journal(doc_id, &state.latest);
        let permanent = matches!(error, PersistError::Ownership { .. } | PersistError::NotFound(_));
        if !state.closed && !permanent && state.mode != SaveMode::Manual {
            self.schedule_locked(&mut state);
        }
    }

    async fn resolve_title(&self, plain_text: &str) -> String {
        if let Some(title) = self.ctx.title().await {
            return title;
        }
        match title::generate(self.titles.as_deref(), plain_text).await {
            Some(title) => {
                self.ctx.set_title(title.as_str()).await;
                title
            }
            None => self.placeholder_title.clone(),
        }
    }

    fn journal(&self, doc_id: Option<DocumentId>, content: &str) {
        let Some(drafts) = &self.drafts else { return };
        match drafts.save_draft(self.ctx.owner, doc_id, content) {
            Ok(()) => log::debug!("unsaved content journaled ({} bytes)", content.len()),
            Err(e) => log::warn!("failed to journal unsaved content: {e}"),
        }
    }

    fn clear_journal(&self, doc_id: Option<DocumentId>) {
        let Some(drafts) = &self.drafts else { return };
        if let Err(e) = drafts.clear_draft(self.ctx.owner, doc_id) {
            log::warn!("failed to clear draft journal: {e}");
        }
    }

    // ─── Accessors ────────────────────────────────────────────────────

    pub(crate) async fn has_unsaved_changes(&self) -> bool {
        self.state.lock().await.dirty
    }

    pub(crate) async fn last_saved_at(&self) -> Option<SystemTime> {
        self.state.lock().await.last_saved_at
    }

    pub(crate) async fn mode(&self) -> SaveMode {
        self.state.lock().await.mode
    }

    pub(crate) async fn phase(&self) -> SavePhase {
        self.state.lock().await.phase
    }

    pub(crate) async fn pattern(&self) -> EditingPattern {
        self.state.lock().await.tracker.pattern().clone()
    }

    pub(crate) async fn current_interval(&self) -> Option<Duration> {
        let state = self.state.lock().await;
        compute_interval(state.mode, state.tracker.pattern(), &self.policy)
    }

    pub(crate) async fn has_pending_timer(&self) -> bool {
        self.state.lock().await.timer.is_armed()
    }

    pub(crate) async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }
}
