//! Wire types and generated service definitions for `notes.v1`
//!
//! Messages mirror `proto/notes.proto`; the client and server plumbing is
//! generated by the build script.

/// A note as it travels on the wire
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Note {
    /// Ignored on input; assigned by the server
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,
    /// Title text
    #[prost(string, tag = "2")]
    pub title: ::prost::alloc::string::String,
    /// Body text
    #[prost(string, tag = "3")]
    pub content: ::prost::alloc::string::String,
}

/// AddNote input
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AddNoteRequest {
    /// Owner tag
    #[prost(string, tag = "1")]
    pub user_id: ::prost::alloc::string::String,
    /// Note to create
    #[prost(message, optional, tag = "2")]
    pub note: ::core::option::Option<Note>,
}

/// AddNote output
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AddNoteResponse {
    /// Generated id
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,
    /// Stored title
    #[prost(string, tag = "2")]
    pub title: ::prost::alloc::string::String,
    /// Stored content
    #[prost(string, tag = "3")]
    pub content: ::prost::alloc::string::String,
}

/// GetNotes input
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetNotesRequest {
    /// Owner tag
    #[prost(string, tag = "1")]
    pub user_id: ::prost::alloc::string::String,
}

/// GetNotes output
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetNotesResponse {
    /// Every stored note
    #[prost(message, repeated, tag = "1")]
    pub notes: ::prost::alloc::vec::Vec<Note>,
}

#[allow(missing_docs)]
mod generated {
    include!(concat!(env!("OUT_DIR"), "/notes.v1.Notes.rs"));
}

pub use generated::{notes_client, notes_server};
