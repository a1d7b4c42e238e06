//! # quill-core — Domain model for the Quill auto-save engine
//!
//! Pure types and policies with no I/O and no runtime:
//!
//! ```text
//!  editor content ──► EditingSession ──► SessionSummary
//!                          │                   │ merge_session
//!                          │                   ▼
//!                          │            EditingPattern ◄── PatternStore
//!                          │                   │
//!                          ▼                   ▼
//!                      SaveMode ──────► compute_interval ──► Option<Duration>
//! ```
//!
//! ## Modules
//!
//! - [`document`] — document fields, version snapshots, plain-text projection
//! - [`pattern`] — learned editing pattern and its storage key
//! - [`interval`] — save modes and the adaptive interval policy
//! - [`learner`] — session telemetry, style classification, preference nudges
//! - [`contract`] — collaborator traits (document store, pattern store, drafts, titles)

pub mod contract;
pub mod document;
pub mod interval;
pub mod learner;
pub mod pattern;

pub use contract::{DocumentStore, DraftStore, PatternStore, StoreFailure, TitleError, TitleGenerator};
pub use document::{
    char_count, plain_text, unix_now, word_count, DocumentFields, DocumentId, EditableDocument,
    OwnerId, VersionDraft, VersionSnapshot,
};
pub use interval::{compute_interval, IntervalPolicy, SaveMode};
pub use learner::{
    classify_style, merge_session, nudge_preference, typing_speed, EditingSession, LearnerConfig,
    SessionSummary,
};
pub use pattern::{EditingPattern, EditingStyle, PatternKey, PatternScope, SavePreference};
