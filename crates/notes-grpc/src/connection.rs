//! Connection tracking for the gRPC listener
//!
//! Every accepted TCP stream is wrapped in a [`TrackedStream`], which holds
//! the `grpc_active_connections` gauge up for as long as the connection lives.

use crate::instrumentation::ACTIVE_CONNECTIONS;
use metrics::gauge;
use pin_project_lite::pin_project;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tonic::transport::server::{Connected, TcpConnectInfo};

/// Increment the active connection gauge
pub fn connection_opened() {
    gauge!(ACTIVE_CONNECTIONS).increment(1.0);
}

/// Decrement the active connection gauge
pub fn connection_closed() {
    gauge!(ACTIVE_CONNECTIONS).decrement(1.0);
}

#[derive(Debug)]
struct ConnectionGuard;

impl ConnectionGuard {
    fn open() -> Self {
        connection_opened();
        Self
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        connection_closed();
    }
}

pin_project! {
    /// Accepted TCP stream counted in `grpc_active_connections`
    #[derive(Debug)]
    pub struct TrackedStream {
        #[pin]
        inner: TcpStream,
        guard: ConnectionGuard,
    }
}

impl TrackedStream {
    /// Start tracking an accepted stream
    pub fn new(inner: TcpStream) -> Self {
        Self {
            inner,
            guard: ConnectionGuard::open(),
        }
    }
}

impl Connected for TrackedStream {
    type ConnectInfo = TcpConnectInfo;

    fn connect_info(&self) -> Self::ConnectInfo {
        self.inner.connect_info()
    }
}

impl AsyncRead for TrackedStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.project().inner.poll_read(cx, buf)
    }
}

impl AsyncWrite for TrackedStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.project().inner.poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_shutdown(cx)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        self.project().inner.poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }
}
