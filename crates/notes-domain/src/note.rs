//! Note module - the single record kept by the service

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Identifier of a note
///
/// Generated identifiers are random UUIDv4 strings, so two notes created
/// back-to-back never share an id and ids cannot be guessed from each other.
/// Any string is accepted when building an id by hand (including the empty
/// string, which is what an unassigned note carries).
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NoteId(String);

impl NoteId {
    /// Generate a fresh random NoteId
    ///
    /// # Examples
    ///
    /// ```
    /// use notes_domain::NoteId;
    ///
    /// let a = NoteId::generate();
    /// let b = NoteId::generate();
    /// assert!(!a.is_empty());
    /// assert_ne!(a, b);
    /// ```
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when no id has been assigned
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume the id, returning the owned string
    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<String> for NoteId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for NoteId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A note
///
/// `id` and `created_at` belong to the orchestrator: whatever a caller puts
/// there is replaced when the note is added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Note {
    /// Unique identifier
    pub id: NoteId,

    /// Title text
    pub title: String,

    /// Body text
    pub content: String,

    /// Owner tag
    pub user_id: String,

    /// Creation time in milliseconds since the Unix epoch (0 = not yet created)
    pub created_at: u64,
}

impl Note {
    /// Create an unassigned note from caller-provided fields
    pub fn new(
        user_id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: NoteId::default(),
            title: title.into(),
            content: content.into(),
            user_id: user_id.into(),
            created_at: 0,
        }
    }

    /// Set the id
    pub fn with_id(mut self, id: impl Into<NoteId>) -> Self {
        self.id = id.into();
        self
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch
///
/// A clock set before 1970 reads as 0 rather than failing.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
