//! Learned editing behavior.
//!
//! An [`EditingPattern`] is the durable summary of how someone edits a
//! document: how fast, in what rhythm, and how often they like to save.
//! It feeds the adaptive interval on every scheduling decision.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::document::{unix_now, DocumentId, OwnerId};

/// Rhythm of an editing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditingStyle {
    /// Short bursts separated by frequent pauses
    Burst,
    /// Long stretches of uninterrupted typing
    Continuous,
    #[default]
    Mixed,
}

/// How eagerly the user wants their work saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SavePreference {
    Frequent,
    #[default]
    Moderate,
    Minimal,
}

impl SavePreference {
    /// One step toward `Frequent`.
    pub fn more_frequent(self) -> Self {
        match self {
            SavePreference::Minimal => SavePreference::Moderate,
            SavePreference::Moderate | SavePreference::Frequent => SavePreference::Frequent,
        }
    }

    /// One step toward `Minimal`.
    pub fn less_frequent(self) -> Self {
        match self {
            SavePreference::Frequent => SavePreference::Moderate,
            SavePreference::Moderate | SavePreference::Minimal => SavePreference::Minimal,
        }
    }
}

impl fmt::Display for EditingStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EditingStyle::Burst => "burst",
            EditingStyle::Continuous => "continuous",
            EditingStyle::Mixed => "mixed",
        };
        f.write_str(s)
    }
}

impl fmt::Display for SavePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SavePreference::Frequent => "frequent",
            SavePreference::Moderate => "moderate",
            SavePreference::Minimal => "minimal",
        };
        f.write_str(s)
    }
}

impl FromStr for EditingStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "burst" => Ok(EditingStyle::Burst),
            "continuous" => Ok(EditingStyle::Continuous),
            "mixed" => Ok(EditingStyle::Mixed),
            other => Err(format!("unknown editing style: {other}")),
        }
    }
}

/// Durable editing behavior for one document or one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditingPattern {
    /// Average editing speed in words per minute (never negative)
    pub avg_speed_wpm: f64,
    pub style: EditingStyle,
    pub save_preference: SavePreference,
    /// Duration of the last meaningful session in seconds
    pub avg_session_secs: f64,
    /// Last update timestamp (seconds since epoch)
    pub last_updated: u64,
    /// Number of sessions merged so far (monotonically non-decreasing)
    pub session_count: u64,
}

impl Default for EditingPattern {
    fn default() -> Self {
        Self {
            avg_speed_wpm: 0.0,
            style: EditingStyle::Mixed,
            save_preference: SavePreference::Moderate,
            avg_session_secs: 0.0,
            last_updated: 0,
            session_count: 0,
        }
    }
}

impl EditingPattern {
    /// Pattern with an explicit style and speed, everything else default.
    pub fn with_style(style: EditingStyle, avg_speed_wpm: f64) -> Self {
        Self {
            style,
            avg_speed_wpm: avg_speed_wpm.max(0.0),
            ..Self::default()
        }
    }

    /// Replace the save preference and stamp the update time.
    pub fn set_save_preference(&mut self, preference: SavePreference) {
        self.save_preference = preference;
        self.last_updated = unix_now();
    }
}

/// Where a pattern is filed in the pattern store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatternKey {
    Document(DocumentId),
    User(OwnerId),
}

impl PatternKey {
    /// Storage key: one tag byte followed by the 16 UUID bytes.
    pub fn to_bytes(&self) -> [u8; 17] {
        let (tag, id) = match self {
            PatternKey::Document(id) => (b'd', id),
            PatternKey::User(id) => (b'u', id),
        };
        let mut key = [0u8; 17];
        key[0] = tag;
        key[1..].copy_from_slice(id.as_bytes());
        key
    }
}

/// Granularity at which patterns are learned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternScope {
    #[default]
    PerDocument,
    PerUser,
}

impl PatternScope {
    /// Resolve the key for a session. Unsaved documents fall back to the owner.
    pub fn key(&self, owner: OwnerId, doc_id: Option<DocumentId>) -> PatternKey {
        match (self, doc_id) {
            (PatternScope::PerDocument, Some(id)) => PatternKey::Document(id),
            _ => PatternKey::User(owner),
        }
    }
}
