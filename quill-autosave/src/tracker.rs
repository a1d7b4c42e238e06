//! Pattern learning for one editing session.
//!
//! Wraps an [`EditingSession`] and the [`EditingPattern`] it feeds, and
//! keeps the pattern store in sync. Store failures are logged; learning is
//! best effort and never blocks saving.

use quill_core::{
    merge_session, nudge_preference, DocumentId, EditingPattern, EditingSession, LearnerConfig,
    OwnerId, PatternKey, PatternScope, PatternStore,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub(crate) struct PatternTracker {
    store: Arc<dyn PatternStore>,
    scope: PatternScope,
    owner: OwnerId,
    key: PatternKey,
    pattern: EditingPattern,
    session: EditingSession,
    config: LearnerConfig,
}

impl PatternTracker {
    pub(crate) fn open(
        store: Arc<dyn PatternStore>,
        scope: PatternScope,
        owner: OwnerId,
        doc_id: Option<DocumentId>,
        initial_content: &str,
        config: LearnerConfig,
        now: Instant,
    ) -> Self {
        let key = scope.key(owner, doc_id);
        let pattern = match store.load_pattern(&key) {
            Ok(Some(pattern)) => {
                log::debug!(
                    "loaded pattern {key:?}: {} at {:.1} wpm, {} sessions",
                    pattern.style,
                    pattern.avg_speed_wpm,
                    pattern.session_count
                );
                pattern
            }
            Ok(None) => EditingPattern::default(),
            Err(e) => {
                log::warn!("failed to load editing pattern {key:?}: {e}");
                EditingPattern::default()
            }
        };

        Self {
            session: EditingSession::start(initial_content, now, &config),
            store,
            scope,
            owner,
            key,
            pattern,
            config,
        }
    }

    pub(crate) fn pattern(&self) -> &EditingPattern {
        &self.pattern
    }

    pub(crate) fn key(&self) -> PatternKey {
        self.key
    }

    pub(crate) fn observe(&mut self, content: &str, now: Instant) {
        self.session.record_change(content, now);
    }

    /// Move the pattern to the document's key once the document has an id.
    pub(crate) fn rekey(&mut self, doc_id: DocumentId) {
        let key = self.scope.key(self.owner, Some(doc_id));
        if key != self.key {
            log::debug!("pattern key {:?} -> {key:?}", self.key);
            self.key = key;
        }
    }

    /// Learn from a forced save made `gap` after the previous save, then persist.
    pub(crate) fn record_forced_save(&mut self, gap: Option<Duration>) {
        let current = self.pattern.save_preference;
        let next = nudge_preference(current, gap, &self.config);
        if next != current {
            log::info!("save preference {current} -> {next}");
        }
        self.pattern.set_save_preference(next);
        self.persist();
    }

    /// Fold the session into the pattern if it lasted long enough.
    pub(crate) fn finish(&mut self, now: Instant) -> Option<EditingPattern> {
        let summary = self.session.summarize(now, &self.config);
        let merged = merge_session(Some(&self.pattern), &summary, &self.config)?;
        log::info!(
            "session learned: {} at {:.1} wpm over {:.0}s ({} keystrokes, {} pauses)",
            merged.style,
            merged.avg_speed_wpm,
            summary.duration.as_secs_f64(),
            summary.keystrokes,
            summary.pauses
        );
        self.pattern = merged.clone();
        self.persist();
        Some(merged)
    }

    fn persist(&self) {
        if let Err(e) = self.store.save_pattern(&self.key, &self.pattern) {
            log::warn!("failed to persist editing pattern {:?}: {e}", self.key);
        }
    }
}
