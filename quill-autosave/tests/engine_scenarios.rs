//! Engine scenarios over the in-memory store, on virtual time.
//!
//! Verifies:
//! - Debounce: repeated changes leave a single pending timer
//! - Manual mode never saves without an explicit force
//! - Dirty flag and last-saved timestamp across success and failure
//! - Retry backoff timing and draft journaling
//! - Version threshold, forced versions and best-effort versioning
//! - Save-preference learning from forced saves
//! - Write serialization with overlapping edits
//! - Close, drop and restore, including restore rollback
//! - Manual mode pauses version snapshots

use async_trait::async_trait;
use quill_autosave::storage::{MemoryStore, StoreCall};
use quill_autosave::{
    AutoSaveEngine, EngineConfig, EngineDeps, EngineError, HeuristicTitleGenerator, OpenDocument,
    PersistError, SavePhase,
};
use quill_core::{
    DocumentFields, OwnerId, PatternKey, SaveMode, SavePreference, TitleError, TitleGenerator,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use uuid::Uuid;

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn config(mode: SaveMode) -> EngineConfig {
    EngineConfig {
        initial_mode: mode,
        ..EngineConfig::default()
    }
}

fn open(store: &Arc<MemoryStore>, mode: SaveMode) -> (AutoSaveEngine, OwnerId) {
    let owner = Uuid::new_v4();
    let engine = AutoSaveEngine::open(
        owner,
        OpenDocument::new_untitled(),
        EngineDeps::from_store(store.clone()),
        config(mode),
    );
    (engine, owner)
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

struct FailingTitles;

#[async_trait]
impl TitleGenerator for FailingTitles {
    async fn generate_title(&self, _: &str) -> Result<String, TitleError> {
        Err(TitleError::Failed("service unavailable".into()))
    }
}

// ─── Scheduling ──────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_rapid_changes_keep_one_timer() {
    let store = Arc::new(MemoryStore::new());
    let (engine, _) = open(&store, SaveMode::Realtime);

    for i in 0..10 {
        engine.report_change(format!("draft {i}")).await.unwrap();
        assert!(engine.has_pending_timer().await);
        sleep(ms(500)).await;
    }
    // last change at t=4500, timer fires at t=6500
    sleep(ms(1_000)).await;
    assert!(store.calls_of(StoreCall::Create).is_empty());

    sleep(ms(1_100)).await;
    let creates = store.calls_of(StoreCall::Create);
    assert_eq!(creates.len(), 1);
    assert_eq!(creates[0].content.as_deref(), Some("draft 9"));
    assert!(!engine.has_pending_timer().await);
}

#[tokio::test(start_paused = true)]
async fn test_manual_mode_never_saves_on_its_own() {
    let store = Arc::new(MemoryStore::new());
    let (engine, _) = open(&store, SaveMode::Manual);

    engine.report_change("typed but not saved").await.unwrap();
    assert_eq!(engine.current_interval().await, None);
    assert!(!engine.has_pending_timer().await);

    sleep(Duration::from_secs(3600)).await;
    assert!(store.calls().iter().all(|c| c.call != StoreCall::Create));
    assert!(engine.has_unsaved_changes().await);
    assert_eq!(engine.save_phase().await, SavePhase::DirtyPending);

    engine.force_save().await.unwrap();
    assert_eq!(store.calls_of(StoreCall::Create).len(), 1);
    assert!(!engine.has_unsaved_changes().await);
}

#[tokio::test(start_paused = true)]
async fn test_successful_save_clears_dirty() {
    let store = Arc::new(MemoryStore::new());
    let (engine, owner) = open(&store, SaveMode::Realtime);
    assert_eq!(engine.save_phase().await, SavePhase::Clean);
    assert!(engine.last_saved_at().await.is_none());

    engine.report_change("hello").await.unwrap();
    assert!(engine.has_unsaved_changes().await);
    assert_eq!(engine.save_phase().await, SavePhase::DirtyPending);

    sleep(ms(2_500)).await;
    assert!(!engine.has_unsaved_changes().await);
    assert!(engine.last_saved_at().await.is_some());
    assert_eq!(engine.save_phase().await, SavePhase::Saved);

    let id = engine.document_id().await.unwrap();
    let doc = store.document(id).unwrap();
    assert_eq!(doc.content, "hello");
    assert_eq!(doc.owner_id, owner);
    assert_eq!(doc.title, "Untitled");
}

#[tokio::test(start_paused = true)]
async fn test_default_adaptive_interval() {
    let store = Arc::new(MemoryStore::new());
    let (engine, _) = open(&store, SaveMode::Adaptive);
    // mixed style, no speed yet (slow), moderate preference: 5000 × 1.2
    assert_eq!(engine.current_interval().await, Some(ms(6_000)));

    engine.set_mode(SaveMode::Conservative).await;
    assert_eq!(engine.current_interval().await, Some(ms(10_000)));
    assert_eq!(engine.mode().await, SaveMode::Conservative);
}

#[tokio::test(start_paused = true)]
async fn test_switching_modes_cancels_and_rearms() {
    let store = Arc::new(MemoryStore::new());
    let (engine, _) = open(&store, SaveMode::Realtime);

    engine.report_change("x").await.unwrap();
    engine.set_mode(SaveMode::Manual).await;
    assert!(!engine.has_pending_timer().await);
    assert!(engine.has_unsaved_changes().await);

    sleep(Duration::from_secs(10)).await;
    assert!(store.calls_of(StoreCall::Create).is_empty());

    engine.set_mode(SaveMode::Realtime).await;
    assert!(engine.has_pending_timer().await);
    sleep(ms(2_100)).await;
    assert_eq!(store.calls_of(StoreCall::Create).len(), 1);
    assert!(!engine.has_unsaved_changes().await);
}

#[tokio::test(start_paused = true)]
async fn test_editing_back_to_saved_content_is_clean() {
    let store = Arc::new(MemoryStore::new());
    let owner = Uuid::new_v4();
    let id = store.insert_document(owner, DocumentFields::new("Notes", "base"));
    let engine = AutoSaveEngine::open(
        owner,
        OpenDocument::existing(id, "Notes", "base"),
        EngineDeps::from_store(store.clone()),
        config(SaveMode::Realtime),
    );

    engine.report_change("base!").await.unwrap();
    assert!(engine.has_unsaved_changes().await);
    engine.report_change("base").await.unwrap();
    assert!(!engine.has_unsaved_changes().await);
    assert!(!engine.has_pending_timer().await);
    assert_eq!(engine.save_phase().await, SavePhase::Clean);

    sleep(Duration::from_secs(5)).await;
    assert!(store.calls_of(StoreCall::Update).is_empty());
}

// ─── Failures ────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_keep_document_dirty() {
    let store = Arc::new(MemoryStore::new());
    let (engine, owner) = open(&store, SaveMode::Realtime);
    store.fail_next_writes(3);

    engine.report_change("draft").await.unwrap();
    // timer at 2000, retries at 3000 and 5000
    sleep(ms(5_500)).await;

    let creates = store.calls_of(StoreCall::Create);
    assert_eq!(creates.len(), 3);
    assert_eq!(creates[1].at - creates[0].at, ms(1_000));
    assert_eq!(creates[2].at - creates[1].at, ms(2_000));

    assert!(engine.has_unsaved_changes().await);
    assert!(engine.last_saved_at().await.is_none());
    assert_eq!(store.draft(owner, None).as_deref(), Some("draft"));
    // re-armed for the next interval
    assert!(engine.has_pending_timer().await);
    assert_eq!(engine.stats().failures, 1);

    sleep(ms(2_000)).await;
    assert!(!engine.has_unsaved_changes().await);
    assert_eq!(engine.save_phase().await, SavePhase::Saved);
    assert_eq!(store.draft(owner, None), None);
    assert_eq!(store.document_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_forced_save_reports_error() {
    let store = Arc::new(MemoryStore::new());
    let (engine, owner) = open(&store, SaveMode::Manual);
    store.fail_next_writes(3);

    engine.report_change("important").await.unwrap();
    let err = engine.force_save().await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Persist(PersistError::Exhausted { attempts: 3, .. })
    ));

    assert!(engine.has_unsaved_changes().await);
    assert_eq!(engine.save_phase().await, SavePhase::ErrorBackoff);
    assert!(!engine.has_pending_timer().await);
    assert!(store.calls_of(StoreCall::CreateVersion).is_empty());
    assert_eq!(store.draft(owner, None).as_deref(), Some("important"));
}

#[tokio::test(start_paused = true)]
async fn test_ownership_violation_is_not_retried() {
    let store = Arc::new(MemoryStore::new());
    let id = store.insert_document(Uuid::new_v4(), DocumentFields::new("Theirs", "old"));
    let intruder = Uuid::new_v4();
    let engine = AutoSaveEngine::open(
        intruder,
        OpenDocument::existing(id, "Theirs", "old"),
        EngineDeps::from_store(store.clone()),
        config(SaveMode::Realtime),
    );

    engine.report_change("new").await.unwrap();
    let err = engine.force_save().await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Persist(PersistError::Ownership { owner, .. }) if owner == intruder
    ));
    assert_eq!(store.calls_of(StoreCall::OwnerOf).len(), 1);
    assert!(store.calls_of(StoreCall::Update).is_empty());
    assert!(engine.has_unsaved_changes().await);
    assert!(!engine.has_pending_timer().await);
    assert_eq!(store.document(id).unwrap().content, "old");
}

#[tokio::test(start_paused = true)]
async fn test_draft_journal_survives_to_next_session() {
    let store = Arc::new(MemoryStore::new());
    let (engine, owner) = open(&store, SaveMode::Conservative);
    store.fail_next_writes(3);

    engine.report_change("unsaved work").await.unwrap();
    assert!(engine.close().await.is_err());

    let next = AutoSaveEngine::open(
        owner,
        OpenDocument::new_untitled(),
        EngineDeps::from_store(store.clone()),
        EngineConfig::default(),
    );
    assert_eq!(next.recover_draft().await.unwrap().as_deref(), Some("unsaved work"));
    next.discard_draft().await.unwrap();
    assert_eq!(next.recover_draft().await.unwrap(), None);
}

// ─── Versions ────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_small_change_saves_but_does_not_version() {
    let store = Arc::new(MemoryStore::new());
    let (engine, _) = open(&store, SaveMode::Adaptive);

    engine.report_change("hello world").await.unwrap();
    assert!(engine.has_pending_version_timer().await);

    sleep(Duration::from_secs(7)).await;
    assert_eq!(store.calls_of(StoreCall::Create).len(), 1);

    sleep(Duration::from_secs(16 * 60)).await;
    let id = engine.document_id().await.unwrap();
    assert!(store.versions(id).is_empty());
    assert!(!engine.has_pending_version_timer().await);
    assert_eq!(engine.unversioned_chars().await, 11);
}

#[tokio::test(start_paused = true)]
async fn test_large_change_gets_auto_version() {
    let store = Arc::new(MemoryStore::new());
    let (engine, _) = open(&store, SaveMode::Adaptive);
    let content = "lorem ipsum ".repeat(10);

    engine.report_change(content.clone()).await.unwrap();
    sleep(Duration::from_secs(15 * 60 + 1)).await;

    let id = engine.document_id().await.unwrap();
    let versions = store.versions(id);
    assert_eq!(versions.len(), 1);
    assert!(versions[0].auto_save);
    assert_eq!(versions[0].content, content);
    assert_eq!(versions[0].version, 1);
}

#[tokio::test(start_paused = true)]
async fn test_forced_save_writes_version_after_update() {
    let store = Arc::new(MemoryStore::new());
    let (engine, _) = open(&store, SaveMode::Manual);

    engine.report_change("tiny").await.unwrap();
    engine.force_save().await.unwrap();

    let id = engine.document_id().await.unwrap();
    let versions = store.versions(id);
    assert_eq!(versions.len(), 1);
    assert!(!versions[0].auto_save);
    assert_eq!(versions[0].content, "tiny");

    let calls: Vec<StoreCall> = store.calls().iter().map(|c| c.call).collect();
    assert_eq!(calls, vec![StoreCall::Create, StoreCall::CreateVersion]);
}

#[tokio::test(start_paused = true)]
async fn test_version_failure_does_not_fail_forced_save() {
    let store = Arc::new(MemoryStore::new());
    let (engine, _) = open(&store, SaveMode::Manual);
    store.fail_next_versions(3);

    engine.report_change("content").await.unwrap();
    engine.force_save().await.unwrap();

    let id = engine.document_id().await.unwrap();
    assert!(store.versions(id).is_empty());
    assert_eq!(store.calls_of(StoreCall::CreateVersion).len(), 3);
    assert!(!engine.has_unsaved_changes().await);
}

#[tokio::test(start_paused = true)]
async fn test_manual_mode_stops_version_snapshots() {
    let store = Arc::new(MemoryStore::new());
    let owner = Uuid::new_v4();
    let id = store.insert_document(owner, DocumentFields::new("Notes", ""));
    let engine = AutoSaveEngine::open(
        owner,
        OpenDocument::existing(id, "Notes", ""),
        EngineDeps::from_store(store.clone()),
        config(SaveMode::Adaptive),
    );

    engine.report_change("v".repeat(100)).await.unwrap();
    assert!(engine.has_pending_version_timer().await);
    engine.set_mode(SaveMode::Manual).await;
    assert!(!engine.has_pending_timer().await);
    assert!(!engine.has_pending_version_timer().await);

    engine.report_change("v".repeat(120)).await.unwrap();
    assert!(!engine.has_pending_version_timer().await);
    sleep(Duration::from_secs(16 * 60)).await;
    assert!(store.calls_of(StoreCall::CreateVersion).is_empty());
    assert!(store.calls_of(StoreCall::Update).is_empty());

    // leaving manual picks the unversioned drift back up
    engine.set_mode(SaveMode::Adaptive).await;
    assert!(engine.has_pending_version_timer().await);
    sleep(Duration::from_secs(15 * 60 + 1)).await;
    let versions = store.versions(id);
    assert_eq!(versions.len(), 1);
    assert!(versions[0].auto_save);
    assert_eq!(versions[0].char_count, 120);
}

#[tokio::test(start_paused = true)]
async fn test_forced_save_supersedes_version_timer() {
    let store = Arc::new(MemoryStore::new());
    let (engine, _) = open(&store, SaveMode::Adaptive);

    engine.report_change("w".repeat(80)).await.unwrap();
    assert!(engine.has_pending_version_timer().await);
    engine.force_save().await.unwrap();
    assert!(!engine.has_pending_version_timer().await);

    sleep(Duration::from_secs(16 * 60)).await;
    let id = engine.document_id().await.unwrap();
    let versions = store.versions(id);
    assert_eq!(versions.len(), 1);
    assert!(!versions[0].auto_save);
}

#[tokio::test(start_paused = true)]
async fn test_restore_version() {
    let store = Arc::new(MemoryStore::new());
    let (engine, _) = open(&store, SaveMode::Manual);

    engine.report_change("first version").await.unwrap();
    engine.force_save().await.unwrap();
    engine.report_change("second version, much longer").await.unwrap();
    engine.force_save().await.unwrap();
    assert_eq!(engine.list_versions().await.unwrap().len(), 2);

    let restored = engine.restore_version(1).await.unwrap();
    assert_eq!(restored.content, "first version");

    let id = engine.document_id().await.unwrap();
    assert_eq!(store.document(id).unwrap().content, "first version");
    assert!(!engine.has_unsaved_changes().await);
    assert_eq!(engine.unversioned_chars().await, 0);
    assert_eq!(store.versions(id).len(), 2);

    assert!(matches!(
        engine.restore_version(9).await,
        Err(EngineError::VersionNotFound(9))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_failed_restore_keeps_previous_content() {
    let store = Arc::new(MemoryStore::new());
    let (engine, owner) = open(&store, SaveMode::Realtime);

    engine.report_change("old version").await.unwrap();
    engine.force_save().await.unwrap();
    engine.report_change("current text").await.unwrap();
    engine.force_save().await.unwrap();
    let id = engine.document_id().await.unwrap();

    engine.report_change("current text, edited").await.unwrap();
    store.fail_next_writes(3);
    let err = engine.restore_version(1).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Persist(PersistError::Exhausted { attempts: 3, .. })
    ));

    // the pre-restore edit is still what the session holds
    assert_eq!(engine.title().await, None);
    assert!(engine.has_unsaved_changes().await);
    assert!(engine.has_pending_timer().await);
    assert_eq!(store.draft(owner, Some(id)).as_deref(), Some("current text, edited"));

    sleep(Duration::from_secs(10)).await;
    assert_eq!(store.document(id).unwrap().content, "current text, edited");
    assert!(!engine.has_unsaved_changes().await);
    assert!(store
        .calls_of(StoreCall::Update)
        .iter()
        .all(|c| c.content.as_deref() != Some("old version")));
}

#[tokio::test(start_paused = true)]
async fn test_failed_restore_of_clean_document_stays_clean() {
    let store = Arc::new(MemoryStore::new());
    let (engine, _) = open(&store, SaveMode::Realtime);

    engine.report_change("old version").await.unwrap();
    engine.force_save().await.unwrap();
    engine.report_change("current text").await.unwrap();
    engine.force_save().await.unwrap();
    let id = engine.document_id().await.unwrap();

    store.fail_next_writes(3);
    assert!(engine.restore_version(1).await.is_err());
    assert!(!engine.has_unsaved_changes().await);
    assert!(!engine.has_pending_timer().await);

    sleep(Duration::from_secs(10)).await;
    assert_eq!(store.document(id).unwrap().content, "current text");
    assert_eq!(store.calls_of(StoreCall::Update).len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_versions_require_a_saved_document() {
    let store = Arc::new(MemoryStore::new());
    let (engine, _) = open(&store, SaveMode::Manual);
    assert!(matches!(engine.list_versions().await, Err(EngineError::Unsaved)));
    assert!(matches!(engine.restore_version(1).await, Err(EngineError::Unsaved)));
}

// ─── Learning ────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_quick_forced_save_nudges_toward_frequent() {
    let store = Arc::new(MemoryStore::new());
    let (engine, _) = open(&store, SaveMode::Adaptive);

    engine.report_change("dem").await.unwrap();
    engine.force_save().await.unwrap();
    let id = engine.document_id().await.unwrap();
    let key = PatternKey::Document(id);
    assert_eq!(store.pattern(&key).unwrap().save_preference, SavePreference::Moderate);

    sleep(Duration::from_secs(3)).await;
    engine.report_change("demo").await.unwrap();
    engine.force_save().await.unwrap();

    assert_eq!(engine.pattern().await.save_preference, SavePreference::Frequent);
    assert_eq!(store.pattern(&key).unwrap().save_preference, SavePreference::Frequent);
    // mixed, slow, frequent: 5000 × 1.2 × 0.7
    assert_eq!(engine.current_interval().await, Some(ms(4_200)));
}

#[tokio::test(start_paused = true)]
async fn test_session_is_learned_on_close() {
    let store = Arc::new(MemoryStore::new());
    let (engine, _) = open(&store, SaveMode::Conservative);

    let mut text = String::new();
    for _ in 0..30 {
        text.push_str("word ");
        engine.report_change(text.clone()).await.unwrap();
        sleep(Duration::from_secs(2)).await;
    }
    engine.close().await.unwrap();

    let id = engine.document_id().await.unwrap();
    let pattern = store.pattern(&PatternKey::Document(id)).unwrap();
    assert_eq!(pattern.session_count, 1);
    assert!(pattern.avg_speed_wpm > 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_short_session_is_not_learned() {
    let store = Arc::new(MemoryStore::new());
    let (engine, _) = open(&store, SaveMode::Realtime);
    engine.report_change("quick note").await.unwrap();
    sleep(Duration::from_secs(3)).await;
    engine.close().await.unwrap();

    let id = engine.document_id().await.unwrap();
    assert!(store.pattern(&PatternKey::Document(id)).is_none());
}

// ─── Titles ──────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_generated_title_is_adopted() {
    let store = Arc::new(MemoryStore::new());
    let engine = AutoSaveEngine::open(
        Uuid::new_v4(),
        OpenDocument::new_untitled(),
        EngineDeps::from_store(store.clone()).with_titles(Arc::new(HeuristicTitleGenerator::default())),
        config(SaveMode::Manual),
    );

    engine.report_change("<p>Trip plan</p><p>day one</p>").await.unwrap();
    engine.force_save().await.unwrap();

    let id = engine.document_id().await.unwrap();
    assert_eq!(store.document(id).unwrap().title, "Trip plan");
    assert_eq!(engine.title().await.as_deref(), Some("Trip plan"));
    assert_eq!(store.versions(id)[0].title, "Trip plan");
}

#[tokio::test(start_paused = true)]
async fn test_title_failure_falls_back_to_placeholder() {
    let store = Arc::new(MemoryStore::new());
    let engine = AutoSaveEngine::open(
        Uuid::new_v4(),
        OpenDocument::new_untitled(),
        EngineDeps::from_store(store.clone()).with_titles(Arc::new(FailingTitles)),
        config(SaveMode::Manual),
    );

    engine.report_change("some text").await.unwrap();
    engine.force_save().await.unwrap();

    let id = engine.document_id().await.unwrap();
    assert_eq!(store.document(id).unwrap().title, "Untitled");
    assert_eq!(engine.title().await, None);
}

// ─── Concurrency ─────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_edits_during_save_are_saved_afterwards() {
    let store = Arc::new(MemoryStore::new());
    store.set_latency(Duration::from_secs(3));
    let (engine, _) = open(&store, SaveMode::Realtime);

    engine.report_change("a").await.unwrap();
    sleep(Duration::from_secs(3)).await;
    // save of "a" in flight from t=2s to t=5s
    assert_eq!(engine.save_phase().await, SavePhase::Saving);
    engine.report_change("ab").await.unwrap();
    assert!(!engine.has_pending_timer().await);

    sleep(ms(2_500)).await;
    assert!(engine.has_unsaved_changes().await);
    assert!(engine.has_pending_timer().await);

    sleep(Duration::from_secs(5)).await;
    let id = engine.document_id().await.unwrap();
    assert_eq!(store.document(id).unwrap().content, "ab");
    assert!(!engine.has_unsaved_changes().await);
    assert_eq!(store.max_concurrent_writes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_forced_save_waits_for_in_flight_save() {
    let store = Arc::new(MemoryStore::new());
    store.set_latency(Duration::from_secs(3));
    let (engine, _) = open(&store, SaveMode::Realtime);

    engine.report_change("a").await.unwrap();
    sleep(ms(2_500)).await;
    engine.report_change("ab").await.unwrap();

    let start = Instant::now();
    engine.force_save().await.unwrap();
    // waits for the create (until t=5s), then update and version at 3s each
    assert_eq!(start.elapsed(), ms(8_500));

    let create = &store.calls_of(StoreCall::Create)[0];
    let update = &store.calls_of(StoreCall::Update)[0];
    assert_eq!(update.at - create.at, Duration::from_secs(3));
    assert_eq!(update.content.as_deref(), Some("ab"));
    assert_eq!(store.max_concurrent_writes(), 1);
    assert!(!engine.has_unsaved_changes().await);
    assert!(!engine.has_pending_timer().await);
}

// ─── Lifecycle ───────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_close_flushes_and_cancels_timers() {
    let store = Arc::new(MemoryStore::new());
    let (engine, _) = open(&store, SaveMode::Adaptive);

    engine.report_change("pending").await.unwrap();
    assert!(engine.has_pending_timer().await);
    assert!(engine.has_pending_version_timer().await);

    engine.close().await.unwrap();
    assert_eq!(store.calls_of(StoreCall::Create).len(), 1);
    assert!(!engine.has_unsaved_changes().await);
    assert!(!engine.has_pending_timer().await);
    assert!(!engine.has_pending_version_timer().await);

    assert!(matches!(engine.report_change("late").await, Err(EngineError::Closed)));
    assert!(matches!(engine.force_save().await, Err(EngineError::Closed)));
    engine.close().await.unwrap();

    sleep(Duration::from_secs(3600)).await;
    assert_eq!(store.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_close_in_manual_mode_does_not_flush() {
    let store = Arc::new(MemoryStore::new());
    let (engine, _) = open(&store, SaveMode::Manual);
    engine.report_change("keep local").await.unwrap();
    engine.close().await.unwrap();
    assert!(store.calls().is_empty());
    assert!(engine.has_unsaved_changes().await);
}

#[tokio::test(start_paused = true)]
async fn test_drop_aborts_timers() {
    let store = Arc::new(MemoryStore::new());
    let (engine, _) = open(&store, SaveMode::Realtime);
    engine.report_change("abandoned").await.unwrap();
    drop(engine);

    sleep(Duration::from_secs(3600)).await;
    assert!(store.calls().is_empty());
}
