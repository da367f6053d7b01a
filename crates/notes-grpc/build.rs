fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Message types are hand-written prost structs (src/proto.rs), so only the
    // service plumbing is generated and no protoc is needed at build time.
    let method = |name: &str, route: &str, input: &str, output: &str| {
        tonic_build::manual::Method::builder()
            .name(name)
            .route_name(route)
            .input_type(format!("crate::proto::{input}"))
            .output_type(format!("crate::proto::{output}"))
            .codec_path("tonic::codec::ProstCodec")
            .build()
    };

    let service = tonic_build::manual::Service::builder()
        .name("Notes")
        .package("notes.v1")
        .method(method("add_note", "AddNote", "AddNoteRequest", "AddNoteResponse"))
        .method(method("get_notes", "GetNotes", "GetNotesRequest", "GetNotesResponse"))
        .build();

    tonic_build::manual::Builder::new()
        .build_server(true)
        .build_client(true)
        .compile(&[service]);

    println!("cargo:rerun-if-changed=build.rs");

    Ok(())
}
