//! Call instrumentation for the gRPC server
//!
//! [`MetricsLayer`] brackets every call (unary and streaming) and records,
//! keyed by the full method path (`/notes.v1.Notes/AddNote`) or `unknown`:
//!
//! - `grpc_requests_in_flight{method}` (gauge): calls currently being served
//! - `grpc_requests_total{method,code}` (counter): completed calls
//! - `grpc_request_duration_seconds{method,code}` (histogram): call latency
//! - `grpc_errors_total{method,type}` (counter): non-OK calls, `type` being
//!   `internal` or `business`
//!
//! A call completes when its response body ends: the trailers carrying
//! `grpc-status` are seen, the body fails, or the body is dropped. A
//! streaming call is therefore observed once for its whole lifetime, and the
//! layer never alters the frames it passes along.
//!
//! Metrics go through the `metrics` facade; [`recorder_builder`] configures the
//! Prometheus exporter that renders them.

use http::{HeaderMap, Request, Response};
use http_body::{Body, Frame, SizeHint};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder};
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use std::sync::Arc;
use std::time::Instant;
use tonic::server::NamedService;
use tonic::Code;
use tower::{Layer, Service};

/// Completed calls, by method and result code
pub const REQUESTS_TOTAL: &str = "grpc_requests_total";
/// Call latency in seconds, by method and result code
pub const REQUEST_DURATION: &str = "grpc_request_duration_seconds";
/// Calls currently in flight, by method
pub const REQUESTS_IN_FLIGHT: &str = "grpc_requests_in_flight";
/// Non-OK calls, by method and error class
pub const ERRORS_TOTAL: &str = "grpc_errors_total";
/// Open client connections
pub const ACTIVE_CONNECTIONS: &str = "grpc_active_connections";

/// Histogram bucket boundaries for [`REQUEST_DURATION`], 1 ms to 10 s
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Prometheus exporter configured for the gRPC metrics
///
/// Every series gets a constant `app` label, and the latency metric is
/// rendered as a histogram with [`LATENCY_BUCKETS`].
pub fn recorder_builder(app_name: &str) -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new()
        .add_global_label("app", app_name)
        .set_buckets_for_metric(Matcher::Full(REQUEST_DURATION.to_string()), LATENCY_BUCKETS)
}

/// Register help text for every metric with the installed recorder
pub fn describe_metrics() {
    metrics::describe_counter!(REQUESTS_TOTAL, "Total number of gRPC requests");
    metrics::describe_histogram!(
        REQUEST_DURATION,
        metrics::Unit::Seconds,
        "gRPC request duration in seconds"
    );
    metrics::describe_gauge!(REQUESTS_IN_FLIGHT, "Current number of gRPC requests being served");
    metrics::describe_counter!(ERRORS_TOTAL, "Total number of gRPC errors");
    metrics::describe_gauge!(ACTIVE_CONNECTIONS, "Current number of active gRPC connections");
}

/// Class of a failed call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The service could not do its job (`INTERNAL`, `UNAVAILABLE`)
    Internal,
    /// Any other non-OK outcome
    Business,
}

impl ErrorClass {
    /// Classify a result code; `None` for `OK`
    pub fn classify(code: Code) -> Option<Self> {
        match code {
            Code::Ok => None,
            Code::Internal | Code::Unavailable => Some(ErrorClass::Internal),
            _ => Some(ErrorClass::Business),
        }
    }

    /// Label value used in `grpc_errors_total`
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Internal => "internal",
            ErrorClass::Business => "business",
        }
    }
}

/// Label value for a result code
pub fn code_label(code: Code) -> &'static str {
    match code {
        Code::Ok => "OK",
        Code::Cancelled => "Canceled",
        Code::Unknown => "Unknown",
        Code::InvalidArgument => "InvalidArgument",
        Code::DeadlineExceeded => "DeadlineExceeded",
        Code::NotFound => "NotFound",
        Code::AlreadyExists => "AlreadyExists",
        Code::PermissionDenied => "PermissionDenied",
        Code::ResourceExhausted => "ResourceExhausted",
        Code::FailedPrecondition => "FailedPrecondition",
        Code::Aborted => "Aborted",
        Code::OutOfRange => "OutOfRange",
        Code::Unimplemented => "Unimplemented",
        Code::Internal => "Internal",
        Code::Unavailable => "Unavailable",
        Code::DataLoss => "DataLoss",
        Code::Unauthenticated => "Unauthenticated",
    }
}

/// Count an error for `method` outside of the automatic call tracking
pub fn report_error(method: &str, class: ErrorClass) {
    counter!(ERRORS_TOTAL, "method" => method.to_owned(), "type" => class.as_str()).increment(1);
}

fn grpc_status(headers: &HeaderMap) -> Option<Code> {
    headers
        .get("grpc-status")
        .map(|v| Code::from_bytes(v.as_bytes()))
}

/// One tracked call
///
/// Created when the call starts; recording happens exactly once, when the
/// guard is dropped. The code is whatever was last seen, `CANCELLED` when the
/// call was abandoned before a status arrived, and `INTERNAL` when the call
/// is being torn down by a panic.
#[derive(Debug)]
struct CallGuard {
    method: String,
    start: Instant,
    code: Option<Code>,
}

impl CallGuard {
    fn start(method: &str) -> Self {
        gauge!(REQUESTS_IN_FLIGHT, "method" => method.to_owned()).increment(1.0);
        Self {
            method: method.to_owned(),
            start: Instant::now(),
            code: None,
        }
    }

    fn finish(mut self, code: Code) {
        self.code = Some(code);
    }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        let code = if std::thread::panicking() {
            Code::Internal
        } else {
            self.code.unwrap_or(Code::Cancelled)
        };
        let elapsed = self.start.elapsed().as_secs_f64();
        let label = code_label(code);

        gauge!(REQUESTS_IN_FLIGHT, "method" => self.method.clone()).decrement(1.0);
        counter!(REQUESTS_TOTAL, "method" => self.method.clone(), "code" => label).increment(1);
        histogram!(REQUEST_DURATION, "method" => self.method.clone(), "code" => label)
            .record(elapsed);

        if let Some(class) = ErrorClass::classify(code) {
            report_error(&self.method, class);
        }
    }
}

/// Label used for any path outside the layer's method set
pub const UNKNOWN_METHOD: &str = "unknown";

/// Tower layer recording call metrics
///
/// Only the method paths the layer is built with get their own `method`
/// label; every other path is recorded under [`UNKNOWN_METHOD`], so callers
/// cannot grow the number of series.
#[derive(Debug, Clone)]
pub struct MetricsLayer {
    methods: Arc<[String]>,
}

impl MetricsLayer {
    /// Create a metrics layer labelling the given method paths
    pub fn new<I, M>(methods: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        Self {
            methods: methods.into_iter().map(Into::into).collect(),
        }
    }
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService {
            inner,
            methods: Arc::clone(&self.methods),
        }
    }
}

/// Service produced by [`MetricsLayer`]
#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
    methods: Arc<[String]>,
}

impl<S> MetricsService<S> {
    fn method_label(&self, path: &str) -> &str {
        self.methods
            .iter()
            .find(|m| m.as_str() == path)
            .map_or(UNKNOWN_METHOD, String::as_str)
    }
}

impl<S: NamedService> NamedService for MetricsService<S> {
    const NAME: &'static str = S::NAME;
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for MetricsService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
{
    type Response = Response<InstrumentedBody<ResBody>>;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let call = CallGuard::start(self.method_label(req.uri().path()));
        ResponseFuture {
            inner: self.inner.call(req),
            call: Some(call),
        }
    }
}

pin_project! {
    /// Response future of [`MetricsService`]
    pub struct ResponseFuture<F> {
        #[pin]
        inner: F,
        call: Option<CallGuard>,
    }
}

impl<F, B, E> Future for ResponseFuture<F>
where
    F: Future<Output = Result<Response<B>, E>>,
{
    type Output = Result<Response<InstrumentedBody<B>>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let mark = MarkOnPanic(this.call);
        let result = ready!(this.inner.poll(cx));
        let mut call = mark.0.take();

        match result {
            Ok(response) => {
                // Trailers-only responses carry the status in the headers.
                let status = grpc_status(response.headers());
                if let (Some(call), Some(code)) = (call.as_mut(), status) {
                    call.code = Some(code);
                }
                Poll::Ready(Ok(response.map(|body| InstrumentedBody { inner: body, call })))
            }
            Err(e) => {
                if let Some(call) = call {
                    call.finish(Code::Unknown);
                }
                Poll::Ready(Err(e))
            }
        }
    }
}

// Marks the call INTERNAL if the handler panics while being polled. The
// panic may be caught further out, after which the guard drops normally.
struct MarkOnPanic<'a>(&'a mut Option<CallGuard>);

impl Drop for MarkOnPanic<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            if let Some(call) = self.0.as_mut() {
                call.code = Some(Code::Internal);
            }
        }
    }
}

pin_project! {
    /// Response body that closes the call's observation when the stream ends
    pub struct InstrumentedBody<B> {
        #[pin]
        inner: B,
        call: Option<CallGuard>,
    }
}

impl<B: Body> Body for InstrumentedBody<B> {
    type Data = B::Data;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();
        let frame = ready!(this.inner.poll_frame(cx));

        match &frame {
            Some(Ok(frame)) => {
                if let Some(trailers) = frame.trailers_ref() {
                    if let Some(call) = this.call.take() {
                        let code = grpc_status(trailers).unwrap_or(Code::Unknown);
                        call.finish(code);
                    }
                }
            }
            Some(Err(_)) => {
                if let Some(call) = this.call.take() {
                    call.finish(Code::Unknown);
                }
            }
            None => {
                if let Some(call) = this.call.take() {
                    let code = call.code.unwrap_or(Code::Unknown);
                    call.finish(code);
                }
            }
        }

        Poll::Ready(frame)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{handle, sample};
    use super::*;
    use bytes::Bytes;
    use http_body_util::{BodyExt, Full, StreamBody};
    use std::convert::Infallible;
    use tokio_stream::wrappers::ReceiverStream;
    use tower::ServiceExt;

    fn request(path: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .uri(format!("http://localhost{path}"))
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    fn trailers(code: Code) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert("grpc-status", (code as i32).to_string().parse().unwrap());
        map
    }

    type FrameStream = futures::stream::Iter<std::vec::IntoIter<Result<Frame<Bytes>, Infallible>>>;

    fn unary_body(code: Code) -> StreamBody<FrameStream> {
        StreamBody::new(futures::stream::iter(vec![
            Ok(Frame::data(Bytes::from_static(b"payload"))),
            Ok(Frame::trailers(trailers(code))),
        ]))
    }

    async fn unary_call(method: &str, code: Code) {
        let inner = tower::service_fn(move |_req: Request<Full<Bytes>>| async move {
            Ok::<_, Infallible>(Response::new(unary_body(code)))
        });
        let response = MetricsLayer::new([method])
            .layer(inner)
            .oneshot(request(method))
            .await
            .unwrap();
        response.into_body().collect().await.unwrap();
    }

    #[test]
    fn test_classification() {
        assert_eq!(ErrorClass::classify(Code::Ok), None);
        assert_eq!(ErrorClass::classify(Code::Internal), Some(ErrorClass::Internal));
        assert_eq!(ErrorClass::classify(Code::Unavailable), Some(ErrorClass::Internal));
        assert_eq!(ErrorClass::classify(Code::InvalidArgument), Some(ErrorClass::Business));
        assert_eq!(ErrorClass::classify(Code::NotFound), Some(ErrorClass::Business));
        assert_eq!(ErrorClass::classify(Code::Unimplemented), Some(ErrorClass::Business));
    }

    #[test]
    fn test_code_labels() {
        assert_eq!(code_label(Code::Ok), "OK");
        assert_eq!(code_label(Code::Cancelled), "Canceled");
        assert_eq!(code_label(Code::Internal), "Internal");
    }

    #[tokio::test]
    async fn test_successful_call_recorded_once() {
        handle();
        let method = "/test.v1.Metrics/Success";

        unary_call(method, Code::Ok).await;

        assert_eq!(sample(REQUESTS_TOTAL, &[("method", method), ("code", "OK")]), Some(1.0));
        assert_eq!(
            sample(&format!("{REQUEST_DURATION}_count"), &[("method", method), ("code", "OK")]),
            Some(1.0)
        );
        assert_eq!(sample(REQUESTS_IN_FLIGHT, &[("method", method)]), Some(0.0));
        assert_eq!(sample(ERRORS_TOTAL, &[("method", method)]), None);
    }

    #[tokio::test]
    async fn test_error_classes() {
        handle();
        let method = "/test.v1.Metrics/Errors";

        unary_call(method, Code::Unavailable).await;
        unary_call(method, Code::Internal).await;
        unary_call(method, Code::NotFound).await;

        assert_eq!(sample(ERRORS_TOTAL, &[("method", method), ("type", "internal")]), Some(2.0));
        assert_eq!(sample(ERRORS_TOTAL, &[("method", method), ("type", "business")]), Some(1.0));
        assert_eq!(
            sample(REQUESTS_TOTAL, &[("method", method), ("code", "NotFound")]),
            Some(1.0)
        );
        assert_eq!(sample(REQUESTS_IN_FLIGHT, &[("method", method)]), Some(0.0));
    }

    #[tokio::test]
    async fn test_trailers_only_response() {
        handle();
        let method = "/test.v1.Metrics/TrailersOnly";

        let inner = tower::service_fn(|_req: Request<Full<Bytes>>| async {
            Ok::<_, Infallible>(tonic::Status::invalid_argument("bad").into_http())
        });
        let response = MetricsLayer::new([method])
            .layer(inner)
            .oneshot(request(method))
            .await
            .unwrap();

        // The body is already at its end; dropping it closes the call.
        drop(response);

        assert_eq!(
            sample(REQUESTS_TOTAL, &[("method", method), ("code", "InvalidArgument")]),
            Some(1.0)
        );
        assert_eq!(sample(ERRORS_TOTAL, &[("method", method), ("type", "business")]), Some(1.0));
        assert_eq!(sample(REQUESTS_IN_FLIGHT, &[("method", method)]), Some(0.0));
    }

    #[tokio::test]
    async fn test_streaming_call_measured_once_for_its_lifetime() {
        handle();
        let method = "/test.v1.Metrics/Stream";
        let (tx, rx) = tokio::sync::mpsc::channel::<Result<Frame<Bytes>, Infallible>>(4);

        let body = std::sync::Mutex::new(Some(StreamBody::new(ReceiverStream::new(rx))));
        let inner = tower::service_fn(move |_req: Request<Full<Bytes>>| {
            let body = body.lock().unwrap().take().unwrap();
            async move { Ok::<_, Infallible>(Response::new(body)) }
        });

        let response = MetricsLayer::new([method])
            .layer(inner)
            .oneshot(request(method))
            .await
            .unwrap();
        let mut body = response.into_body();
        assert_eq!(sample(REQUESTS_IN_FLIGHT, &[("method", method)]), Some(1.0));

        for chunk in ["one", "two", "three"] {
            tx.send(Ok(Frame::data(Bytes::from(chunk)))).await.unwrap();
            let frame = body.frame().await.unwrap().unwrap();
            assert!(frame.is_data());
        }
        assert_eq!(sample(REQUESTS_IN_FLIGHT, &[("method", method)]), Some(1.0));
        assert_eq!(sample(REQUESTS_TOTAL, &[("method", method)]), None);

        tx.send(Ok(Frame::trailers(trailers(Code::Ok)))).await.unwrap();
        drop(tx);
        while body.frame().await.is_some() {}

        assert_eq!(sample(REQUESTS_IN_FLIGHT, &[("method", method)]), Some(0.0));
        assert_eq!(sample(REQUESTS_TOTAL, &[("method", method), ("code", "OK")]), Some(1.0));
    }

    #[tokio::test]
    async fn test_abandoned_body_counts_as_cancelled() {
        handle();
        let method = "/test.v1.Metrics/Abandoned";

        let inner = tower::service_fn(|_req: Request<Full<Bytes>>| async {
            Ok::<_, Infallible>(Response::new(unary_body(Code::Ok)))
        });
        let response = MetricsLayer::new([method])
            .layer(inner)
            .oneshot(request(method))
            .await
            .unwrap();
        drop(response);

        assert_eq!(
            sample(REQUESTS_TOTAL, &[("method", method), ("code", "Canceled")]),
            Some(1.0)
        );
        assert_eq!(sample(REQUESTS_IN_FLIGHT, &[("method", method)]), Some(0.0));
    }

    #[tokio::test]
    async fn test_unlisted_paths_share_one_label() {
        handle();
        let known = "/test.v1.Metrics/Listed";
        let layer = MetricsLayer::new([known]);

        for i in 0..20 {
            let inner = tower::service_fn(|_req: Request<Full<Bytes>>| async {
                Ok::<_, Infallible>(Response::new(unary_body(Code::Unimplemented)))
            });
            let path = format!("/spam.v1.Flood/M{i}");
            let response = layer.layer(inner).oneshot(request(&path)).await.unwrap();
            response.into_body().collect().await.unwrap();
        }

        let rendered = handle().render();
        assert!(!rendered.contains("spam.v1.Flood"));
        assert!(
            sample(
                REQUESTS_TOTAL,
                &[("method", UNKNOWN_METHOD), ("code", "Unimplemented")]
            )
            .unwrap_or(0.0)
                >= 20.0
        );
        assert_eq!(sample(REQUESTS_TOTAL, &[("method", known)]), None);
    }

    #[tokio::test]
    async fn test_result_is_untouched() {
        let inner = tower::service_fn(|_req: Request<Full<Bytes>>| async {
            Ok::<_, Infallible>(Response::new(unary_body(Code::NotFound)))
        });
        let method = "/test.v1.Metrics/Untouched";
        let response = MetricsLayer::new([method])
            .layer(inner)
            .oneshot(request(method))
            .await
            .unwrap();

        let collected = response.into_body().collect().await.unwrap();
        let trailers = collected.trailers().cloned().unwrap();
        assert_eq!(grpc_status(&trailers), Some(Code::NotFound));
        assert_eq!(collected.to_bytes(), Bytes::from_static(b"payload"));
    }

    #[tokio::test]
    async fn test_recovered_panic_recorded_as_internal() {
        handle();
        let method = "/test.v1.Metrics/Panics";

        let inner = tower::service_fn(|_req: Request<Full<Bytes>>| async {
            if true {
                panic!("handler crashed");
            }
            Ok::<_, Infallible>(Response::new(unary_body(Code::Ok)))
        });
        let service = tower::ServiceBuilder::new()
            .layer(crate::RecoveryLayer::new())
            .layer(MetricsLayer::new([method]))
            .service(inner);

        let response = service.oneshot(request(method)).await.unwrap();
        assert_eq!(grpc_status(response.headers()), Some(Code::Internal));

        assert_eq!(
            sample(REQUESTS_TOTAL, &[("method", method), ("code", "Internal")]),
            Some(1.0)
        );
        assert_eq!(sample(ERRORS_TOTAL, &[("method", method), ("type", "internal")]), Some(1.0));
        assert_eq!(sample(REQUESTS_IN_FLIGHT, &[("method", method)]), Some(0.0));
    }

    #[test]
    fn test_report_error() {
        handle();
        report_error("/test.v1.Metrics/Manual", ErrorClass::Business);
        assert_eq!(
            sample(ERRORS_TOTAL, &[("method", "/test.v1.Metrics/Manual"), ("type", "business")]),
            Some(1.0)
        );
    }

    #[test]
    fn test_app_label_applied() {
        handle();
        report_error("/test.v1.Metrics/Labelled", ErrorClass::Internal);
        assert_eq!(
            sample(ERRORS_TOTAL, &[("method", "/test.v1.Metrics/Labelled"), ("app", "notes_test")]),
            Some(1.0)
        );
    }
}
