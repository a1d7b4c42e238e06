//! Storage backends for the auto-save engine.
//!
//! Architecture:
//! ```text
//! ┌───────────────┐  create/update/version  ┌──────────────┐
//! │ AutoSaveEngine│ ──────────────────────► │ DocumentStore│ (remote or LocalStore)
//! │               │                         └──────────────┘
//! │               │  load/save pattern      ┌──────────────┐
//! │               │ ──────────────────────► │ PatternStore │
//! │               │  save/clear draft       ├──────────────┤
//! │               │ ──────────────────────► │ DraftStore   │
//! └───────────────┘                         └──────────────┘
//! ```
//!
//! [`LocalStore`] is a durable RocksDB implementation of all three
//! contracts. [`MemoryStore`] keeps everything in memory and can inject
//! faults and latency.

pub mod memory;
pub mod rocks;

pub use memory::{CallRecord, FaultPlan, MemoryStore, StoreCall};
pub use rocks::{DocumentMetadata, LocalStore, StoreConfig, StoreError};
