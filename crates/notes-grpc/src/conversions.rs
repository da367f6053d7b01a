///! Type conversions between proto and domain types
///!
///! Translation only: no field is validated or rejected here.

use notes_domain::{Note, NoteId};
use crate::proto;

/// Build an unassigned domain note from an AddNote request
///
/// A request without a `note` message yields empty title and content.
/// Any `note.id` the caller sent is dropped: ids belong to the usecase.
pub fn note_from_add_request(req: proto::AddNoteRequest) -> Note {
    let (title, content) = req
        .note
        .map(|n| (n.title, n.content))
        .unwrap_or_default();

    Note::new(req.user_id, title, content)
}

/// Build the AddNote response from the generated id and the submitted note
pub fn add_response(id: NoteId, note: Note) -> proto::AddNoteResponse {
    proto::AddNoteResponse {
        id: id.into_string(),
        title: note.title,
        content: note.content,
    }
}

/// Convert a domain note to its wire form
///
/// Owner tag and creation time are not part of the wire shape.
pub fn note_to_proto(note: Note) -> proto::Note {
    proto::Note {
        id: note.id.into_string(),
        title: note.title,
        content: note.content,
    }
}

/// Build the GetNotes response
pub fn get_notes_response(notes: Vec<Note>) -> proto::GetNotesResponse {
    proto::GetNotesResponse {
        notes: notes.into_iter().map(note_to_proto).collect(),
    }
}
