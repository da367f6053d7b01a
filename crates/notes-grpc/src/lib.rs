#![warn(missing_docs)]

//! Notes gRPC Service Layer
//!
//! Exposes the notes usecase over gRPC and wraps every call with the
//! service's cross-cutting concerns:
//! - AddNote / GetNotes translation between wire messages and domain notes
//! - Panic recovery, turning a crashed handler into an `INTERNAL` status
//! - Per-method call metrics (count, latency, in-flight, error class)
//! - Active-connection tracking
//! - Listener lifecycle with graceful, deadline-bounded shutdown

pub mod proto;

pub mod connection;
pub mod conversions;
pub mod instrumentation;
pub mod recovery;
pub mod server;
pub mod service;

pub use instrumentation::MetricsLayer;
pub use recovery::RecoveryLayer;
pub use server::{NotesGrpcServer, ServerConfig, ServerError, ServerState};
pub use service::NotesServiceImpl;
