//! Version manager: periodic auto-save snapshots and manual snapshots.
//!
//! Every reported change re-arms a long timer (15 minutes by default). When
//! it fires, a snapshot is written only if the content has drifted at least
//! `min_char_delta` characters from the last versioned content. Small drift
//! is skipped without re-arming; the next change arms the timer again.
//!
//! Snapshots are written under the document's write gate and their
//! failures are logged, never surfaced. While paused (manual save mode)
//! the timer is never armed; a forced save's snapshot supersedes it.

use quill_core::{char_count, DocumentId, VersionDraft};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::context::DocumentContext;
use crate::timer::TimerSlot;

/// Version snapshot policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionConfig {
    pub enabled: bool,
    /// Delay between the last change and an automatic snapshot (default: 15 minutes)
    pub interval_ms: u64,
    /// Minimum character drift for an automatic snapshot (default: 50)
    pub min_char_delta: usize,
}

impl Default for VersionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 15 * 60 * 1000,
            min_char_delta: 50,
        }
    }
}

impl VersionConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

struct VersionState {
    current: String,
    last_versioned: String,
    title: String,
    timer: TimerSlot,
    paused: bool,
    closed: bool,
}

impl VersionState {
    fn drift(&self) -> usize {
        char_count(&self.current).abs_diff(char_count(&self.last_versioned))
    }

    fn is_versioned(&self) -> bool {
        self.current == self.last_versioned
    }
}

pub(crate) struct VersionManager {
    ctx: Arc<DocumentContext>,
    config: VersionConfig,
    state: Mutex<VersionState>,
}

impl VersionManager {
    pub(crate) fn new(
        ctx: Arc<DocumentContext>,
        config: VersionConfig,
        baseline: &str,
        title: &str,
        paused: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            config,
            state: Mutex::new(VersionState {
                current: baseline.to_string(),
                last_versioned: baseline.to_string(),
                title: title.to_string(),
                timer: TimerSlot::new("version"),
                paused,
                closed: false,
            }),
        })
    }

    /// Track new content and restart the snapshot timer.
    pub(crate) async fn note_change(self: &Arc<Self>, content: &str) {
        let mut state = self.state.lock().await;
        if state.closed {
            return;
        }
        state.current.clear();
        state.current.push_str(content);
        self.arm_locked(&mut state);
    }

    /// Stop (or resume) automatic snapshots. Resuming re-arms when there is
    /// unversioned content.
    pub(crate) async fn set_paused(self: &Arc<Self>, paused: bool) {
        let mut state = self.state.lock().await;
        let was_paused = std::mem::replace(&mut state.paused, paused);
        if was_paused == paused || state.closed {
            return;
        }
        if paused {
            state.timer.cancel();
        } else if !state.is_versioned() {
            self.arm_locked(&mut state);
        }
    }

    fn arm_locked(self: &Arc<Self>, state: &mut VersionState) {
        if !self.config.enabled || state.paused {
            return;
        }
        let weak = Arc::downgrade(self);
        state.timer.arm(self.config.interval(), move |generation| async move {
            if let Some(manager) = weak.upgrade() {
                manager.on_tick(generation).await;
            }
        });
    }

    /// Remember the title used by the latest successful save.
    pub(crate) async fn note_saved(&self, title: &str) {
        let mut state = self.state.lock().await;
        if state.title != title {
            state.title = title.to_string();
        }
        log::trace!("saved; {} chars since last version", state.drift());
    }

    async fn on_tick(&self, generation: u64) {
        let (content, title) = {
            let mut state = self.state.lock().await;
            if !state.timer.claim(generation) || state.closed || state.paused {
                return;
            }
            let drift = state.drift();
            if drift < self.config.min_char_delta {
                log::debug!(
                    "version skipped: {drift} chars changed, {} required",
                    self.config.min_char_delta
                );
                return;
            }
            (state.current.clone(), state.title.clone())
        };

        let _gate = self.ctx.lock_writes().await;
        {
            let state = self.state.lock().await;
            if state.closed || state.paused {
                return;
            }
        }
        let Some(doc_id) = self.ctx.doc_id().await else {
            log::debug!("version skipped: document not saved yet");
            return;
        };
        self.write_locked(doc_id, &title, &content, true).await;
    }

    /// Write a manual snapshot. The caller must hold the write gate.
    ///
    /// On success the pending timer is cancelled unless newer content has
    /// been reported since `content`.
    pub(crate) async fn snapshot_locked(&self, doc_id: DocumentId, title: &str, content: &str) -> Option<u64> {
        let number = self.write_locked(doc_id, title, content, false).await?;
        let mut state = self.state.lock().await;
        if state.is_versioned() {
            state.timer.cancel();
        }
        Some(number)
    }

    async fn write_locked(&self, doc_id: DocumentId, title: &str, content: &str, auto_save: bool) -> Option<u64> {
        let draft = VersionDraft::new(title, content, auto_save);
        match self.ctx.client.write_version(self.ctx.owner, doc_id, &draft).await {
            Ok(number) => {
                log::info!(
                    "version {number} of {doc_id} written ({} chars, auto_save={auto_save})",
                    draft.char_count
                );
                let mut state = self.state.lock().await;
                state.last_versioned.clear();
                state.last_versioned.push_str(content);
                Some(number)
            }
            Err(e) => {
                log::warn!("version snapshot of {doc_id} failed: {e}");
                None
            }
        }
    }

    /// Treat `content` as already versioned, e.g. after a restore.
    pub(crate) async fn reset_baseline(&self, content: &str) {
        let mut state = self.state.lock().await;
        state.current = content.to_string();
        state.last_versioned = content.to_string();
        state.timer.cancel();
    }

    pub(crate) async fn close(&self) {
        let mut state = self.state.lock().await;
        state.closed = true;
        state.timer.cancel();
    }

    pub(crate) async fn has_pending_timer(&self) -> bool {
        self.state.lock().await.timer.is_armed()
    }

    pub(crate) async fn pending_drift(&self) -> usize {
        self.state.lock().await.drift()
    }
}
