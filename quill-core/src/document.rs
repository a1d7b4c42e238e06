//! Document records as seen by the auto-save engine.
//!
//! The engine never owns an [`EditableDocument`]; it only asks a store to
//! create or update one from a [`DocumentFields`] payload. Version snapshots
//! are immutable once the store has assigned them a number.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::SystemTime;
use uuid::Uuid;

/// Identifier of a stored document.
pub type DocumentId = Uuid;

/// Identifier of the user who owns a document.
pub type OwnerId = Uuid;

/// Seconds since the Unix epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Payload sent to a document store on create or update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFields {
    pub title: String,
    /// Rich-text payload exactly as produced by the editor
    pub content: String,
    /// Plain-text projection of `content`
    pub plain_text: String,
    /// Free-form metadata forwarded to the store untouched
    pub metadata: BTreeMap<String, String>,
}

impl DocumentFields {
    /// Build fields from a title and rich content, deriving the plain-text projection.
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            title: title.into(),
            plain_text: plain_text(&content),
            content,
            metadata: BTreeMap::new(),
        }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A live, mutable document record held by a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditableDocument {
    pub id: DocumentId,
    pub owner_id: OwnerId,
    pub title: String,
    pub content: String,
    pub plain_text: String,
    pub metadata: BTreeMap<String, String>,
    /// Creation timestamp (seconds since epoch)
    pub created_at: u64,
    /// Last modified timestamp (seconds since epoch)
    pub updated_at: u64,
}

impl EditableDocument {
    /// Create a fresh record from its initial fields.
    pub fn new(id: DocumentId, owner_id: OwnerId, fields: DocumentFields) -> Self {
        let now = unix_now();
        Self {
            id,
            owner_id,
            title: fields.title,
            content: fields.content,
            plain_text: fields.plain_text,
            metadata: fields.metadata,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrite the mutable fields, bumping `updated_at`.
    pub fn apply(&mut self, fields: DocumentFields) {
        self.title = fields.title;
        self.content = fields.content;
        self.plain_text = fields.plain_text;
        self.metadata = fields.metadata;
        self.updated_at = unix_now().max(self.created_at);
    }
}

/// Snapshot contents before the store assigns a version number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionDraft {
    pub title: String,
    pub content: String,
    /// `true` when written by the periodic version timer rather than a manual save
    pub auto_save: bool,
    pub word_count: u64,
    pub char_count: u64,
}

impl VersionDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>, auto_save: bool) -> Self {
        let content = content.into();
        Self {
            title: title.into(),
            word_count: word_count(&plain_text(&content)) as u64,
            char_count: char_count(&content) as u64,
            content,
            auto_save,
        }
    }

    /// Freeze the draft into an immutable snapshot.
    pub fn into_snapshot(self, doc_id: DocumentId, version: u64, created_at: u64) -> VersionSnapshot {
        VersionSnapshot {
            doc_id,
            version,
            title: self.title,
            content: self.content,
            auto_save: self.auto_save,
            word_count: self.word_count,
            char_count: self.char_count,
            created_at,
        }
    }
}

/// Immutable point-in-time copy of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSnapshot {
    pub doc_id: DocumentId,
    /// Monotonically increasing per document, starting at 1
    pub version: u64,
    pub title: String,
    pub content: String,
    pub auto_save: bool,
    pub word_count: u64,
    pub char_count: u64,
    /// Creation timestamp (seconds since epoch)
    pub created_at: u64,
}

/// Project a rich-text payload onto plain text.
///
/// Tags are dropped, block-level closing tags and `<br>` become newlines,
/// and the common HTML entities are decoded. Plain input passes through.
pub fn plain_text(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '<' => {
                let mut tag = String::new();
                for t in chars.by_ref() {
                    if t == '>' {
                        break;
                    }
                    tag.push(t);
                }
                if is_line_break_tag(&tag) && !out.ends_with('\n') {
                    out.push('\n');
                }
            }
            '&' => {
                let mut entity = String::new();
                while let Some(&t) = chars.peek() {
                    if !(t.is_ascii_alphanumeric() || t == '#') || entity.len() > 6 {
                        break;
                    }
                    entity.push(t);
                    chars.next();
                }
                let decoded = match entity.as_str() {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "#39" | "apos" => Some('\''),
                    "nbsp" => Some(' '),
                    _ => None,
                };
                match (decoded, chars.peek()) {
                    (Some(d), Some(';')) => {
                        chars.next();
                        out.push(d);
                    }
                    _ => {
                        out.push('&');
                        out.push_str(&entity);
                    }
                }
            }
            _ => out.push(c),
        }
    }

    out.trim().to_string()
}

fn is_line_break_tag(tag: &str) -> bool {
    let name = tag
        .trim()
        .trim_end_matches('/')
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    matches!(
        name.as_str(),
        "br" | "/p" | "/div" | "/li" | "/h1" | "/h2" | "/h3" | "/h4" | "/h5" | "/h6" | "/blockquote"
    )
}

/// Whitespace-separated token count.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Length in Unicode scalar values.
pub fn char_count(text: &str) -> usize {
    text.chars().count()
}
