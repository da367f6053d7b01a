//! Notes Usecase Layer
//!
//! Applies the creation rules before a note reaches storage:
//! - Every added note gets a fresh random id, whatever the caller sent
//! - Every added note is stamped with its creation time
//! - Retrieval returns every stored note (the `user_id` argument does not
//!   filter)
//!
//! # Examples
//!
//! ```
//! use notes_domain::{Note, NoteUsecase};
//! use notes_store::InMemoryStore;
//! use notes_usecase::BasicNotes;
//! use std::sync::Arc;
//!
//! let notes = BasicNotes::new(Arc::new(InMemoryStore::new()));
//! let id = notes.add_note(Note::new("u1", "T", "C"));
//! assert!(!id.is_empty());
//! assert_eq!(notes.get_notes("u1").len(), 1);
//! ```

#![warn(missing_docs)]

mod basic;

pub use basic::BasicNotes;
