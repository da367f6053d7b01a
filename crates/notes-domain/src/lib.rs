//! Notes Domain Layer
//!
//! This crate contains the domain model for the notes service and the trait
//! interfaces the other layers are written against. Its only external
//! dependency is `uuid`, which provides identifier generation.
//!
//! ## Key Concepts
//!
//! - **Note**: The sole record - a titled piece of text owned by a user tag
//! - **NoteId**: Opaque identifier assigned by the orchestrator on creation
//! - **NoteStore**: Keyed collection of notes, safe under concurrent access
//! - **NoteUsecase**: Creation rules (id + timestamp) layered on a store
//!
//! ## Architecture
//!
//! - Pure business types only
//! - Storage and transport implementations live in other crates
//! - Trait definitions for every seam another implementation could replace

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod note;
pub mod traits;

// Re-exports for convenience
pub use note::{Note, NoteId};
pub use traits::{NoteStore, NoteUsecase};
