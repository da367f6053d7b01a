///! gRPC server configuration and lifecycle management
///!
///! Binds the listener, assembles the interceptor chain, and drives the
///! Created -> Listening -> Draining -> Stopped lifecycle with a
///! deadline-bounded graceful stop.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use notes_domain::NoteUsecase;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_stream::StreamExt;
use tonic::transport::Server;
use tower::ServiceBuilder;
use tracing::{info, warn};

use crate::connection::TrackedStream;
use crate::instrumentation::MetricsLayer;
use crate::proto::notes_server::NotesServer;
use crate::recovery::RecoveryLayer;
use crate::service::{NotesServiceImpl, NOTES_METHODS};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server listen address
    pub addr: String,

    /// Server port, 0 picks an ephemeral one
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1".to_string(),
            port: 50051,
        }
    }
}

impl ServerConfig {
    /// Create a new server configuration
    pub fn new(addr: impl Into<String>, port: u16) -> Self {
        Self {
            addr: addr.into(),
            port,
        }
    }

    /// Get the full server address
    pub fn full_address(&self) -> String {
        format!("{}:{}", self.addr, self.port)
    }
}

/// Lifecycle of a [`NotesGrpcServer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Constructed, not yet bound
    Created,
    /// Accepting connections
    Listening,
    /// Refusing new connections, waiting on in-flight calls
    Draining,
    /// Fully stopped
    Stopped,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServerState::Created => "created",
            ServerState::Listening => "listening",
            ServerState::Draining => "draining",
            ServerState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Errors raised while starting or stopping the gRPC server
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configured address does not parse as host:port
    #[error("invalid listen address '{0}'")]
    InvalidAddress(String),

    /// The listener could not be bound
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested
        addr: String,
        /// Underlying socket error
        #[source]
        source: std::io::Error,
    },

    /// The transport stopped with an error
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// In-flight calls did not finish before the deadline
    #[error("graceful shutdown did not finish within {0:?}")]
    ShutdownTimeout(Duration),

    /// The requested action is not valid in the current state
    #[error("cannot {action} a server that is {state}")]
    InvalidState {
        /// State the server was in
        state: ServerState,
        /// Action that was attempted
        action: &'static str,
    },

    /// The serving task panicked or was cancelled
    #[error("server task failed: {0}")]
    Task(String),
}

type ServeTask = JoinHandle<Result<(), tonic::transport::Error>>;

/// gRPC binder for the notes usecase
///
/// Every call passes through panic recovery first, then call metrics, then
/// the service handler. Accepted connections are counted in the active
/// connection gauge until they close.
pub struct NotesGrpcServer<U: NoteUsecase + 'static> {
    config: ServerConfig,
    usecase: Arc<U>,
    state: ServerState,
    local_addr: Option<SocketAddr>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<ServeTask>,
}

impl<U: NoteUsecase + 'static> NotesGrpcServer<U> {
    /// Create a server in the `Created` state
    pub fn new(config: ServerConfig, usecase: Arc<U>) -> Self {
        Self {
            config,
            usecase,
            state: ServerState::Created,
            local_addr: None,
            shutdown_tx: None,
            task: None,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Address actually bound, once listening
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Bind the listener and start serving in the background
    ///
    /// # Errors
    /// Returns error if the server was already started, the address is
    /// invalid, or the port cannot be bound
    pub async fn start(&mut self) -> Result<SocketAddr, ServerError> {
        if self.state != ServerState::Created {
            return Err(ServerError::InvalidState {
                state: self.state,
                action: "start",
            });
        }

        let requested = self.config.full_address();
        let addr: SocketAddr = requested
            .parse()
            .map_err(|_| ServerError::InvalidAddress(requested.clone()))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: requested.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: requested,
            source,
        })?;

        let incoming = TcpListenerStream::new(listener).map(|conn| conn.map(TrackedStream::new));

        // Interceptors wrap the notes service only; unrouted paths never reach them.
        let notes = NotesServer::new(NotesServiceImpl::new(Arc::clone(&self.usecase)));
        let service = ServiceBuilder::new()
            .layer(RecoveryLayer::new())
            .layer(MetricsLayer::new(NOTES_METHODS.iter().copied()))
            .service(notes);
        let router = Server::builder().add_service(service);

        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            router
                .serve_with_incoming_shutdown(incoming, async {
                    let _ = rx.await;
                })
                .await
        });

        info!(address = %local_addr, "gRPC server listening");

        self.local_addr = Some(local_addr);
        self.shutdown_tx = Some(tx);
        self.task = Some(task);
        self.state = ServerState::Listening;

        Ok(local_addr)
    }

    /// Stop accepting connections and wait for in-flight calls
    ///
    /// If the calls have not finished by `deadline` the server is stopped
    /// forcibly and [`ServerError::ShutdownTimeout`] is returned. Either way
    /// the server ends up `Stopped`.
    ///
    /// # Errors
    /// Returns error if the server is not listening, the deadline elapses,
    /// or the transport failed while serving
    pub async fn stop(&mut self, deadline: Duration) -> Result<(), ServerError> {
        if self.state != ServerState::Listening {
            return Err(ServerError::InvalidState {
                state: self.state,
                action: "stop",
            });
        }

        self.state = ServerState::Draining;
        info!(?deadline, "draining gRPC server");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        let result = match self.task.take() {
            Some(mut task) => match tokio::time::timeout(deadline, &mut task).await {
                Ok(Ok(served)) => served.map_err(ServerError::from),
                Ok(Err(join)) => Err(ServerError::Task(join.to_string())),
                Err(_) => {
                    warn!(?deadline, "graceful shutdown timed out, forcing stop");
                    task.abort();
                    Err(ServerError::ShutdownTimeout(deadline))
                }
            },
            None => Ok(()),
        };

        self.state = ServerState::Stopped;
        info!("gRPC server stopped");

        result
    }
}

impl<U: NoteUsecase + 'static> Drop for NotesGrpcServer<U> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
