//! HTTP observability endpoints.
//!
//! `/metrics` renders the Prometheus exposition text and `/health` answers
//! a plain `OK` for liveness probes.

use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    routing::get,
    Router as AxumRouter,
};
use metrics_exporter_prometheus::PrometheusHandle;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Build the observability router
pub fn create_router(metrics: PrometheusHandle) -> AxumRouter {
    AxumRouter::new()
        .route("/metrics", get(render_metrics))
        .route("/health", get(health))
        .with_state(metrics)
}

async fn render_metrics(State(metrics): State<PrometheusHandle>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], metrics.render())
}

async fn health() -> &'static str {
    "OK"
}
