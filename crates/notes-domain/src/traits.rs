//! Trait definitions for the layers around the domain
//!
//! These traits define the boundaries between domain logic and infrastructure.
//! Implementations live in other crates.

use crate::{Note, NoteId};
use std::sync::Arc;

/// Keyed collection of notes
///
/// Implemented by the infrastructure layer (notes-store). Both operations
/// take `&self`: implementations synchronise internally so a single store can
/// be shared behind an `Arc` by every in-flight call.
pub trait NoteStore: Send + Sync {
    /// Insert the note, replacing any record already stored under `note.id`
    fn put(&self, note: Note);

    /// Point-in-time copy of every stored note, in no particular order
    fn list(&self) -> Vec<Note>;
}

/// Creation and retrieval rules on top of a [`NoteStore`]
///
/// Implemented by the application layer (notes-usecase).
pub trait NoteUsecase: Send + Sync {
    /// Assign a fresh id and creation time, store the note, return the id
    fn add_note(&self, note: Note) -> NoteId;

    /// Notes visible to `user_id`
    fn get_notes(&self, user_id: &str) -> Vec<Note>;
}

impl<T: NoteStore + ?Sized> NoteStore for Arc<T> {
    fn put(&self, note: Note) {
        (**self).put(note)
    }

    fn list(&self) -> Vec<Note> {
        (**self).list()
    }
}

impl<T: NoteUsecase + ?Sized> NoteUsecase for Arc<T> {
    fn add_note(&self, note: Note) -> NoteId {
        (**self).add_note(note)
    }

    fn get_notes(&self, user_id: &str) -> Vec<Note> {
        (**self).get_notes(user_id)
    }
}
