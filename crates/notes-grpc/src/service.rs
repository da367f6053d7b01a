///! gRPC service implementation
///!
///! Implements the Notes trait generated from the service definition.

use std::sync::Arc;
use tonic::{Request, Response, Status};
use notes_domain::NoteUsecase;

use crate::proto::notes_server::Notes;
use crate::proto::*;
use crate::conversions::{add_response, get_notes_response, note_from_add_request};

/// Full paths of every method served by [`NotesServiceImpl`]
pub const NOTES_METHODS: &[&str] = &["/notes.v1.Notes/AddNote", "/notes.v1.Notes/GetNotes"];

/// Implementation of the Notes service
pub struct NotesServiceImpl<U: NoteUsecase> {
    usecase: Arc<U>,
}

impl<U: NoteUsecase> NotesServiceImpl<U> {
    /// Create a new service instance
    pub fn new(usecase: Arc<U>) -> Self {
        Self { usecase }
    }
}

#[tonic::async_trait]
impl<U> Notes for NotesServiceImpl<U>
where
    U: NoteUsecase + 'static,
{
    async fn add_note(
        &self,
        request: Request<AddNoteRequest>,
    ) -> Result<Response<AddNoteResponse>, Status> {
        let note = note_from_add_request(request.into_inner());
        let id = self.usecase.add_note(note.clone());

        Ok(Response::new(add_response(id, note)))
    }

    async fn get_notes(
        &self,
        request: Request<GetNotesRequest>,
    ) -> Result<Response<GetNotesResponse>, Status> {
        let req = request.into_inner();
        let notes = self.usecase.get_notes(&req.user_id);

        Ok(Response::new(get_notes_response(notes)))
    }
}
