//! # quill-autosave — Adaptive auto-save and versioning engine
//!
//! Decides when in-progress edits are persisted, writes periodic version
//! snapshots and recovers from transient store failures.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────── AutoSaveEngine ────────────────────────────┐
//! │                                                                        │
//! │  report_change ──► SaveScheduler ───────────┐                          │
//! │                     │  TimerSlot (debounce) │                          │
//! │                     │  PatternTracker       ▼                          │
//! │                     │               PersistenceClient ──► DocumentStore│
//! │                     ▼                       ▲   timeout + backoff      │
//! │                VersionManager ──────────────┘                          │
//! │                     TimerSlot (15 min)                                 │
//! │                                                                        │
//! │  one write gate per document: at most one store write in flight        │
//! └────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`engine`] — façade, configuration and dependency wiring
//! - [`persistence`] — retrying, timing-out store client
//! - [`versioning`] — version snapshot policy
//! - [`storage`] — RocksDB and in-memory stores
//! - [`title`] — built-in title generator
//!
//! ## Example
//!
//! ```ignore
//! let store = Arc::new(LocalStore::open(StoreConfig::default())?);
//! let engine = AutoSaveEngine::open(
//!     owner,
//!     OpenDocument::new_untitled(),
//!     EngineDeps::from_store(store),
//!     EngineConfig::default(),
//! );
//! engine.report_change("<p>hello</p>").await?;
//! engine.force_save().await?;
//! engine.close().await?;
//! ```

mod context;
pub mod engine;
pub mod error;
pub mod persistence;
mod scheduler;
pub mod storage;
mod timer;
pub mod title;
mod tracker;
pub mod versioning;

pub use engine::{AutoSaveEngine, EngineConfig, EngineDeps, OpenDocument};
pub use error::{ConfigError, EngineError, PersistError};
pub use persistence::{PersistStats, PersistenceClient, RetryConfig};
pub use scheduler::SavePhase;
pub use storage::{LocalStore, MemoryStore, StoreConfig, StoreError};
pub use title::HeuristicTitleGenerator;
pub use versioning::VersionConfig;
