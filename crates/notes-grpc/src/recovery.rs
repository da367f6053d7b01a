//! Panic recovery for gRPC calls
//!
//! Outermost layer of the call chain. A panic raised while a handler is
//! called or polled is caught here, logged, and answered with an `INTERNAL`
//! status instead of tearing down the connection task.

use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use http::{Request, Response};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::task::{Context, Poll};
use tonic::body::BoxBody;
use tonic::server::NamedService;
use tonic::Status;
use tower::{Layer, Service};
use tracing::error;

/// Message sent to the caller when a handler panics
pub const PANIC_MESSAGE: &str = "internal error";

/// Tower layer that converts handler panics into `INTERNAL` responses
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryLayer;

impl RecoveryLayer {
    /// Create a new recovery layer
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for RecoveryLayer {
    type Service = Recovery<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Recovery { inner }
    }
}

/// Service produced by [`RecoveryLayer`]
#[derive(Debug, Clone)]
pub struct Recovery<S> {
    inner: S,
}

impl<S: NamedService> NamedService for Recovery<S> {
    const NAME: &'static str = S::NAME;
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for Recovery<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ResBody: http_body::Body<Data = Bytes> + Send + 'static,
    ResBody::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    type Response = Response<BoxBody>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let method = req.uri().path().to_owned();

        let fut = match catch_unwind(AssertUnwindSafe(|| self.inner.call(req))) {
            Ok(fut) => fut,
            Err(panic) => {
                let response = panic_response(&method, panic);
                return async move { Ok(response) }.boxed();
            }
        };

        async move {
            match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(Ok(response)) => Ok(response.map(tonic::body::boxed)),
                Ok(Err(e)) => Err(e),
                Err(panic) => Ok(panic_response(&method, panic)),
            }
        }
        .boxed()
    }
}

fn panic_response(method: &str, panic: Box<dyn Any + Send>) -> Response<BoxBody> {
    error!(method, panic = %panic_message(panic.as_ref()), "recovered from panic in gRPC handler");
    Status::internal(PANIC_MESSAGE).into_http()
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}
