//! In-memory store with scriptable faults.
//!
//! Implements the same contracts as [`LocalStore`](super::LocalStore) and
//! records every document-store call with its (virtual) timestamp, which
//! makes retry, backoff and serialization behavior observable in tests.

use async_trait::async_trait;
use quill_core::{
    unix_now, DocumentFields, DocumentId, DocumentStore, DraftStore, EditableDocument,
    EditingPattern, OwnerId, PatternKey, PatternStore, StoreFailure, VersionDraft,
    VersionSnapshot,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Kind of document-store call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreCall {
    Create,
    OwnerOf,
    Update,
    CreateVersion,
    LoadVersion,
    ListVersions,
}

/// One recorded call.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub call: StoreCall,
    pub doc_id: Option<DocumentId>,
    /// Virtual time at which the call started
    pub at: Instant,
    /// Content carried by create/update/version calls
    pub content: Option<String>,
}

/// Faults to inject into upcoming calls.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    /// Fail this many upcoming create/update calls with a transient error
    pub failing_writes: u32,
    /// Fail this many upcoming version writes with a transient error
    pub failing_versions: u32,
    /// Delay applied to every create/update/version call
    pub latency: Duration,
    /// Make the draft journal fail
    pub failing_drafts: bool,
}

#[derive(Default)]
struct MemoryState {
    documents: HashMap<DocumentId, EditableDocument>,
    versions: HashMap<DocumentId, Vec<VersionSnapshot>>,
    patterns: HashMap<PatternKey, EditingPattern>,
    drafts: HashMap<(OwnerId, Option<DocumentId>), String>,
    calls: Vec<CallRecord>,
}

/// In-memory document, pattern and draft store.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    faults: Mutex<FaultPlan>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn faults(&self) -> MutexGuard<'_, FaultPlan> {
        self.faults.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ─── Fault scripting ──────────────────────────────────────────────

    pub fn fail_next_writes(&self, n: u32) {
        self.faults().failing_writes = n;
    }

    pub fn fail_next_versions(&self, n: u32) {
        self.faults().failing_versions = n;
    }

    pub fn set_latency(&self, latency: Duration) {
        self.faults().latency = latency;
    }

    pub fn fail_drafts(&self, failing: bool) {
        self.faults().failing_drafts = failing;
    }

    // ─── Inspection ───────────────────────────────────────────────────

    /// Seed a document directly, bypassing call recording.
    pub fn insert_document(&self, owner: OwnerId, fields: DocumentFields) -> DocumentId {
        let doc = EditableDocument::new(Uuid::new_v4(), owner, fields);
        let id = doc.id;
        self.state().documents.insert(id, doc);
        id
    }

    pub fn document(&self, doc_id: DocumentId) -> Option<EditableDocument> {
        self.state().documents.get(&doc_id).cloned()
    }

    pub fn document_count(&self) -> usize {
        self.state().documents.len()
    }

    pub fn versions(&self, doc_id: DocumentId) -> Vec<VersionSnapshot> {
        self.state().versions.get(&doc_id).cloned().unwrap_or_default()
    }

    pub fn pattern(&self, key: &PatternKey) -> Option<EditingPattern> {
        self.state().patterns.get(key).cloned()
    }

    pub fn draft(&self, owner: OwnerId, doc_id: Option<DocumentId>) -> Option<String> {
        self.state().drafts.get(&(owner, doc_id)).cloned()
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.state().calls.clone()
    }

    /// Recorded calls of one kind, in order.
    pub fn calls_of(&self, call: StoreCall) -> Vec<CallRecord> {
        self.state()
            .calls
            .iter()
            .filter(|c| c.call == call)
            .cloned()
            .collect()
    }

    /// Highest number of concurrently executing write calls observed.
    pub fn max_concurrent_writes(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    // ─── Helpers ──────────────────────────────────────────────────────

    fn record(&self, call: StoreCall, doc_id: Option<DocumentId>, content: Option<&str>) {
        self.state().calls.push(CallRecord {
            call,
            doc_id,
            at: Instant::now(),
            content: content.map(str::to_string),
        });
    }

    /// Run a write under latency and the given fault counter.
    async fn write_gate(&self, take_fault: impl FnOnce(&mut FaultPlan) -> bool) -> Result<(), StoreFailure> {
        let (latency, fail) = {
            let mut faults = self.faults();
            let fail = take_fault(&mut faults);
            (faults.latency, fail)
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if fail {
            return Err(StoreFailure::Unavailable("injected fault".into()));
        }
        Ok(())
    }
}

/// Decrements the in-flight counter on drop, including when a call is cancelled.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn take_one(counter: &mut u32) -> bool {
    if *counter > 0 {
        *counter -= 1;
        true
    } else {
        false
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create(&self, owner: OwnerId, fields: DocumentFields) -> Result<DocumentId, StoreFailure> {
        self.record(StoreCall::Create, None, Some(&fields.content));
        self.write_gate(|f| take_one(&mut f.failing_writes)).await?;

        let doc = EditableDocument::new(Uuid::new_v4(), owner, fields);
        let id = doc.id;
        self.state().documents.insert(id, doc);
        Ok(id)
    }

    async fn owner_of(&self, doc_id: DocumentId) -> Result<Option<OwnerId>, StoreFailure> {
        self.record(StoreCall::OwnerOf, Some(doc_id), None);
        Ok(self.state().documents.get(&doc_id).map(|d| d.owner_id))
    }

    async fn update(
        &self,
        owner: OwnerId,
        doc_id: DocumentId,
        fields: DocumentFields,
    ) -> Result<(), StoreFailure> {
        self.record(StoreCall::Update, Some(doc_id), Some(&fields.content));
        self.write_gate(|f| take_one(&mut f.failing_writes)).await?;

        let mut state = self.state();
        let doc = state
            .documents
            .get_mut(&doc_id)
            .ok_or(StoreFailure::NotFound(doc_id))?;
        if doc.owner_id != owner {
            return Err(StoreFailure::NotOwned { doc_id, owner });
        }
        doc.apply(fields);
        Ok(())
    }

    async fn create_version(
        &self,
        owner: OwnerId,
        doc_id: DocumentId,
        draft: VersionDraft,
    ) -> Result<u64, StoreFailure> {
        self.record(StoreCall::CreateVersion, Some(doc_id), Some(&draft.content));
        self.write_gate(|f| take_one(&mut f.failing_versions)).await?;

        let mut state = self.state();
        match state.documents.get(&doc_id) {
            None => return Err(StoreFailure::NotFound(doc_id)),
            Some(doc) if doc.owner_id != owner => {
                return Err(StoreFailure::NotOwned { doc_id, owner })
            }
            Some(_) => {}
        }
        let versions = state.versions.entry(doc_id).or_default();
        let number = versions.last().map_or(1, |v| v.version + 1);
        versions.push(draft.into_snapshot(doc_id, number, unix_now()));
        Ok(number)
    }

    async fn load_version(
        &self,
        doc_id: DocumentId,
        version: u64,
    ) -> Result<Option<VersionSnapshot>, StoreFailure> {
        self.record(StoreCall::LoadVersion, Some(doc_id), None);
        Ok(self
            .state()
            .versions
            .get(&doc_id)
            .and_then(|vs| vs.iter().find(|v| v.version == version).cloned()))
    }

    async fn list_versions(&self, doc_id: DocumentId) -> Result<Vec<VersionSnapshot>, StoreFailure> {
        self.record(StoreCall::ListVersions, Some(doc_id), None);
        Ok(self.versions(doc_id))
    }
}

impl PatternStore for MemoryStore {
    fn load_pattern(&self, key: &PatternKey) -> Result<Option<EditingPattern>, StoreFailure> {
        Ok(self.state().patterns.get(key).cloned())
    }

    fn save_pattern(&self, key: &PatternKey, pattern: &EditingPattern) -> Result<(), StoreFailure> {
        self.state().patterns.insert(*key, pattern.clone());
        Ok(())
    }
}

impl DraftStore for MemoryStore {
    fn save_draft(&self, owner: OwnerId, doc_id: Option<DocumentId>, content: &str) -> Result<(), StoreFailure> {
        if self.faults().failing_drafts {
            return Err(StoreFailure::Unavailable("injected draft fault".into()));
        }
        self.state().drafts.insert((owner, doc_id), content.to_string());
        Ok(())
    }

    fn load_draft(&self, owner: OwnerId, doc_id: Option<DocumentId>) -> Result<Option<String>, StoreFailure> {
        Ok(self.draft(owner, doc_id))
    }

    fn clear_draft(&self, owner: OwnerId, doc_id: Option<DocumentId>) -> Result<(), StoreFailure> {
        self.state().drafts.remove(&(owner, doc_id));
        Ok(())
    }
}
