//! Persistence client: timeout, ownership check and retry with backoff.
//!
//! ```text
//! attempt 1 ──✗──► sleep 1000ms ──► attempt 2 ──✗──► sleep 2000ms ──► attempt 3 ──✗──► Exhausted
//!     │                                 │                                 │
//!     └── each attempt races `timeout` ─┴─────────────────────────────────┘
//! ```
//!
//! Ownership and not-found failures end the operation immediately; only
//! transient failures are retried.

use quill_core::{
    DocumentFields, DocumentId, DocumentStore, OwnerId, StoreFailure, VersionDraft,
    VersionSnapshot,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::PersistError;

/// Retry policy. All durations are milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first (default: 3)
    pub max_attempts: u32,
    /// Per-attempt timeout (default: 10000)
    pub timeout_ms: u64,
    /// Delay after the first failed attempt (default: 1000)
    pub base_delay_ms: u64,
    /// Upper bound on any single delay (default: 5000)
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout_ms: 10_000,
            base_delay_ms: 1_000,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Delay after failed attempt `attempt` (1-based): `min(base × 2^(attempt-1), max)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63);
        let ms = self
            .base_delay_ms
            .saturating_mul(1u64 << exp)
            .min(self.max_delay_ms);
        Duration::from_millis(ms)
    }
}

/// Persistence counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistStats {
    pub attempts: u64,
    pub retries: u64,
    pub timeouts: u64,
    pub successes: u64,
    pub failures: u64,
}

#[derive(Default)]
struct AtomicPersistStats {
    attempts: AtomicU64,
    retries: AtomicU64,
    timeouts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
}

impl AtomicPersistStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> PersistStats {
        PersistStats {
            attempts: self.attempts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Wraps a [`DocumentStore`] with timeout, ownership check and retry.
#[derive(Clone)]
pub struct PersistenceClient {
    store: Arc<dyn DocumentStore>,
    config: RetryConfig,
    stats: Arc<AtomicPersistStats>,
}

impl PersistenceClient {
    pub fn new(store: Arc<dyn DocumentStore>, config: RetryConfig) -> Self {
        Self {
            store,
            config,
            stats: Arc::new(AtomicPersistStats::default()),
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn stats(&self) -> PersistStats {
        self.stats.snapshot()
    }

    /// Create the document when `doc_id` is `None`, otherwise update it.
    ///
    /// Returns the id of the persisted document.
    pub async fn save(
        &self,
        owner: OwnerId,
        doc_id: Option<DocumentId>,
        fields: &DocumentFields,
    ) -> Result<DocumentId, PersistError> {
        let store = &self.store;
        match doc_id {
            None => {
                self.run("create", move || async move {
                    store.create(owner, fields.clone()).await
                })
                .await
            }
            Some(id) => {
                self.run("update", move || async move {
                    match store.owner_of(id).await {
                        Err(e) => Err(e),
                        Ok(None) => Err(StoreFailure::NotFound(id)),
                        Ok(Some(actual)) if actual != owner => {
                            Err(StoreFailure::NotOwned { doc_id: id, owner })
                        }
                        Ok(Some(_)) => store.update(owner, id, fields.clone()).await.map(|()| id),
                    }
                })
                .await
            }
        }
    }

    /// Write a version snapshot and return its number.
    pub async fn write_version(
        &self,
        owner: OwnerId,
        doc_id: DocumentId,
        draft: &VersionDraft,
    ) -> Result<u64, PersistError> {
        let store = &self.store;
        self.run("create_version", move || async move {
            store.create_version(owner, doc_id, draft.clone()).await
        })
        .await
    }

    pub async fn load_version(
        &self,
        doc_id: DocumentId,
        version: u64,
    ) -> Result<Option<VersionSnapshot>, PersistError> {
        let store = &self.store;
        self.run("load_version", move || async move {
            store.load_version(doc_id, version).await
        })
        .await
    }

    pub async fn list_versions(&self, doc_id: DocumentId) -> Result<Vec<VersionSnapshot>, PersistError> {
        let store = &self.store;
        self.run("list_versions", move || async move { store.list_versions(doc_id).await })
            .await
    }

    async fn run<T, F, Fut>(&self, op: &str, mut attempt_fn: F) -> Result<T, PersistError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreFailure>>,
    {
        let attempts = self.config.max_attempts.max(1);
        let mut last = String::new();

        for attempt in 1..=attempts {
            AtomicPersistStats::bump(&self.stats.attempts);
            if attempt > 1 {
                AtomicPersistStats::bump(&self.stats.retries);
            }

            let failure = match tokio::time::timeout(self.config.timeout(), attempt_fn()).await {
                Ok(Ok(value)) => {
                    AtomicPersistStats::bump(&self.stats.successes);
                    return Ok(value);
                }
                Ok(Err(StoreFailure::NotOwned { doc_id, owner })) => {
                    AtomicPersistStats::bump(&self.stats.failures);
                    log::error!("{op} rejected: document {doc_id} is not owned by {owner}");
                    return Err(PersistError::Ownership { doc_id, owner });
                }
                Ok(Err(StoreFailure::NotFound(doc_id))) => {
                    AtomicPersistStats::bump(&self.stats.failures);
                    log::error!("{op} rejected: document {doc_id} not found");
                    return Err(PersistError::NotFound(doc_id));
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => {
                    AtomicPersistStats::bump(&self.stats.timeouts);
                    format!("timed out after {}ms", self.config.timeout_ms)
                }
            };

            if attempt < attempts {
                let delay = self.config.backoff_delay(attempt);
                log::warn!(
                    "{op} attempt {attempt}/{attempts} failed: {failure}; retrying in {}ms",
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            } else {
                log::error!("{op} attempt {attempt}/{attempts} failed: {failure}; giving up");
            }
            last = failure;
        }

        AtomicPersistStats::bump(&self.stats.failures);
        Err(PersistError::Exhausted { attempts, last })
    }
}
