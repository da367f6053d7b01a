//! Integration tests for the notes server

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use metrics_exporter_prometheus::PrometheusHandle;
use notes_grpc::instrumentation::recorder_builder;
use notes_grpc::proto::notes_client::NotesClient;
use notes_grpc::proto::{self, AddNoteRequest, GetNotesRequest};
use notes_server::{
    config::{AppConfig, ConfigError, Env},
    http::create_router,
    install_recorder, App,
};
use std::io::Write;
use std::sync::OnceLock;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tower::ServiceExt; // for oneshot

/// Process-wide recorder shared by the tests that run a full service
fn installed_handle() -> PrometheusHandle {
    static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
    HANDLE
        .get_or_init(|| install_recorder("notes_it").expect("install recorder"))
        .clone()
}

fn local_config() -> AppConfig {
    r#"
        env = "local"
        app_name = "notes_it"

        [grpc]
        port = 0
        address = "127.0.0.1"
        shutdown_timeout_secs = 5

        [prometheus]
        port = 0
        address = "127.0.0.1"
    "#
    .parse()
    .unwrap()
}

async fn http_get(addr: std::net::SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn test_health_endpoint() {
    let handle = recorder_builder("notes_unit").unwrap().build_recorder().handle();
    let app = create_router(handle);

    let request = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"OK");
}

#[tokio::test]
async fn test_metrics_endpoint_content_type() {
    let handle = recorder_builder("notes_unit").unwrap().build_recorder().handle();
    let app = create_router(handle);

    let request = Request::builder()
        .method("GET")
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"],
        "text/plain; version=0.0.4"
    );
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let handle = recorder_builder("notes_unit").unwrap().build_recorder().handle();
    let app = create_router(handle);

    let request = Request::builder()
        .uri("/notes")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_service_round_trip_and_metrics() {
    let app = App::start(&local_config(), installed_handle()).await.unwrap();

    let mut client = NotesClient::connect(format!("http://{}", app.grpc_addr()))
        .await
        .unwrap();

    let added = client
        .add_note(AddNoteRequest {
            user_id: "u1".to_string(),
            note: Some(proto::Note {
                id: String::new(),
                title: "Hello".to_string(),
                content: "World".to_string(),
            }),
        })
        .await
        .unwrap()
        .into_inner();

    let notes = client
        .get_notes(GetNotesRequest {
            user_id: "u1".to_string(),
        })
        .await
        .unwrap()
        .into_inner()
        .notes;
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].id, added.id);

    let health = http_get(app.http_addr(), "/health").await;
    assert!(health.starts_with("HTTP/1.1 200"));
    assert!(health.ends_with("OK"));

    let metrics = http_get(app.http_addr(), "/metrics").await;
    assert!(metrics.contains("grpc_requests_total{"));
    assert!(metrics.contains(r#"app="notes_it""#));
    assert!(metrics.contains(r#"method="/notes.v1.Notes/AddNote""#));
    assert!(metrics.contains("grpc_request_duration_seconds_bucket{"));

    drop(client);
    app.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_releases_ports() {
    let app = App::start(&local_config(), installed_handle()).await.unwrap();
    let grpc_addr = app.grpc_addr();
    let http_addr = app.http_addr();

    app.shutdown().await.unwrap();

    assert!(std::net::TcpListener::bind(grpc_addr).is_ok());
    assert!(std::net::TcpListener::bind(http_addr).is_ok());
}

#[test]
fn test_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
        env = "dev"

        [grpc]
        port = 44044

        [prometheus]
        port = 9090
        "#
    )
    .unwrap();

    let config = AppConfig::from_file(file.path()).unwrap();
    assert_eq!(config.env, Env::Dev);
    assert_eq!(config.app_name, "notes_service");
    assert_eq!(config.grpc.port, 44044);
    assert_eq!(config.grpc.shutdown_timeout_secs, 30);
    assert_eq!(config.prometheus.port, 9090);
}

#[test]
fn test_config_file_with_bad_env() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
        env = "qa"

        [grpc]
        port = 1

        [prometheus]
        port = 2
        "#
    )
    .unwrap();

    let err = AppConfig::from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::TomlParse(_)));
}
