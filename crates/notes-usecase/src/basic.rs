//! Default orchestrator over any NoteStore

use notes_domain::note::now_millis;
use notes_domain::{Note, NoteId, NoteStore, NoteUsecase};
use std::sync::Arc;
use tracing::debug;

/// Orchestrator assigning ids and timestamps before delegating to a store
pub struct BasicNotes<S: NoteStore> {
    store: Arc<S>,
}

impl<S: NoteStore> BasicNotes<S> {
    /// Create an orchestrator over the given store
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}

impl<S: NoteStore> Clone for BasicNotes<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: NoteStore> NoteUsecase for BasicNotes<S> {
    fn add_note(&self, mut note: Note) -> NoteId {
        note.id = NoteId::generate();
        note.created_at = now_millis();
        let id = note.id.clone();

        debug!(note_id = %id, user_id = %note.user_id, "adding note");
        self.store.put(note);
        id
    }

    fn get_notes(&self, user_id: &str) -> Vec<Note> {
        // The owner tag is not used as a filter.
        let notes = self.store.list();
        debug!(user_id, count = notes.len(), "listing notes");
        notes
    }
}
