//! Notes Storage Layer
//!
//! Implements the NoteStore trait over process memory.
//!
//! # Architecture
//!
//! - One `HashMap` keyed by note id holds every record
//! - A single `RwLock` guards the map: any number of concurrent `list` calls,
//!   one `put` at a time
//! - Nothing survives a restart
//!
//! # Examples
//!
//! ```
//! use notes_domain::{Note, NoteStore};
//! use notes_store::InMemoryStore;
//!
//! let store = InMemoryStore::new();
//! store.put(Note::new("u1", "T", "C").with_id("n1"));
//! assert_eq!(store.list().len(), 1);
//! ```

#![warn(missing_docs)]

use notes_domain::{Note, NoteId, NoteStore};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::trace;

/// In-memory implementation of NoteStore
///
/// # Thread Safety
///
/// The store is `Sync`; share it behind an `Arc`. A panic while the write
/// lock is held cannot leave the map half-written (the only write is a single
/// `insert`), so a poisoned lock is recovered instead of propagated.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    notes: RwLock<HashMap<NoteId, Note>>,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored notes
    pub fn len(&self) -> usize {
        self.notes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// True when no notes are stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NoteStore for InMemoryStore {
    fn put(&self, note: Note) {
        let id = note.id.clone();
        let replaced = {
            let mut notes = self.notes.write().unwrap_or_else(PoisonError::into_inner);
            notes.insert(id.clone(), note).is_some()
        };
        trace!(note_id = %id, replaced, "note stored");
    }

    fn list(&self) -> Vec<Note> {
        let notes = self.notes.read().unwrap_or_else(PoisonError::into_inner);
        notes.values().cloned().collect()
    }
}
