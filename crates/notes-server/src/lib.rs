//! Notes Server
//!
//! Wires the in-memory store, the notes usecase and the gRPC binder into a
//! running process, alongside the Prometheus metrics and health endpoint.

#![warn(missing_docs)]

pub mod config;
pub mod http;
pub mod logging;

use config::AppConfig;
use metrics_exporter_prometheus::PrometheusHandle;
use notes_grpc::instrumentation::{describe_metrics, recorder_builder};
use notes_grpc::{NotesGrpcServer, ServerConfig, ServerError};
use notes_store::InMemoryStore;
use notes_usecase::BasicNotes;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// How often the recorder drains histogram buffers
const UPKEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Application error
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Logging could not be initialized
    #[error("Failed to initialize logging: {0}")]
    Logging(String),

    /// Metrics recorder could not be installed
    #[error("Failed to install metrics recorder: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    /// gRPC server error
    #[error("gRPC server error: {0}")]
    Grpc(#[from] ServerError),

    /// HTTP endpoint binding error
    #[error("Failed to bind metrics endpoint: {0}")]
    Bind(#[from] std::io::Error),

    /// HTTP endpoint failed while serving
    #[error("Metrics endpoint error: {0}")]
    Http(String),
}

type NotesBinder = NotesGrpcServer<BasicNotes<InMemoryStore>>;

/// A running notes service
pub struct App {
    grpc: NotesBinder,
    grpc_addr: SocketAddr,
    http_addr: SocketAddr,
    http_shutdown: oneshot::Sender<()>,
    http_task: JoinHandle<std::io::Result<()>>,
    upkeep_task: JoinHandle<()>,
    shutdown_timeout: Duration,
}

impl App {
    /// Build the component graph and start both listeners
    ///
    /// `metrics` is the handle of the recorder the metric macros report to.
    pub async fn start(config: &AppConfig, metrics: PrometheusHandle) -> Result<Self, AppError> {
        let store = Arc::new(InMemoryStore::new());
        let usecase = Arc::new(BasicNotes::new(store));

        let mut grpc = NotesGrpcServer::new(
            ServerConfig::new(config.grpc.address.clone(), config.grpc.port),
            usecase,
        );
        let grpc_addr = grpc.start().await?;

        let listener = TcpListener::bind(config.prometheus_addr()).await?;
        let http_addr = listener.local_addr()?;

        let upkeep_handle = metrics.clone();
        let upkeep_task = tokio::spawn(async move {
            let mut tick = tokio::time::interval(UPKEEP_INTERVAL);
            loop {
                tick.tick().await;
                upkeep_handle.run_upkeep();
            }
        });

        let (http_shutdown, rx) = oneshot::channel::<()>();
        let router = http::create_router(metrics);
        let http_task = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await
        });

        info!(grpc = %grpc_addr, metrics = %http_addr, "notes service started");

        Ok(Self {
            grpc,
            grpc_addr,
            http_addr,
            http_shutdown,
            http_task,
            upkeep_task,
            shutdown_timeout: config.shutdown_timeout(),
        })
    }

    /// Address the gRPC server is bound to
    pub fn grpc_addr(&self) -> SocketAddr {
        self.grpc_addr
    }

    /// Address the metrics endpoint is bound to
    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    /// Drain the gRPC server within the configured deadline, then stop the
    /// metrics endpoint
    pub async fn shutdown(mut self) -> Result<(), AppError> {
        info!("shutting down notes service");

        let grpc_result = self.grpc.stop(self.shutdown_timeout).await;
        if let Err(e) = &grpc_result {
            error!(error = %e, "gRPC server did not stop cleanly");
        }

        let _ = self.http_shutdown.send(());
        let http_result = match self.http_task.await {
            Ok(served) => served.map_err(|e| AppError::Http(e.to_string())),
            Err(join) => Err(AppError::Http(join.to_string())),
        };
        self.upkeep_task.abort();

        info!("notes service stopped");

        grpc_result?;
        http_result
    }
}

/// Install the process-wide Prometheus recorder
pub fn install_recorder(app_name: &str) -> Result<PrometheusHandle, AppError> {
    let handle = recorder_builder(app_name)?.install_recorder()?;
    describe_metrics();
    Ok(handle)
}

/// Run the service until SIGINT or SIGTERM
pub async fn run(config: AppConfig) -> Result<(), AppError> {
    let metrics = install_recorder(&config.app_name)?;
    let app = App::start(&config, metrics).await?;

    shutdown_signal().await;

    app.shutdown().await
}

/// Wait for Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
