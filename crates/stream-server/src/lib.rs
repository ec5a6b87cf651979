//! stream-server — the loopback HTTP range server.
//!
//! A single route, `/stream/{stream_id}`, dispatching on method: `HEAD`
//! returns metadata only, `GET` returns the full stream or, with a `Range`
//! header, a `206 Partial Content` slice served from the chunk cache.

mod error;
mod handler;
mod range;
mod registry;

pub use error::{ServerError, ServerResult};
pub use handler::ServerState;
pub use registry::{RegisteredStream, Registry};

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use stream_fetch::Fetcher;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::info;

/// Wraps a bound [`TcpListener`], disabling Nagle's algorithm on every
/// accepted connection (spec.md §4.5 body-emission step 6: "Disable the
/// transport's small-write batching policy for lower write latency").
/// `axum::serve` accepts anything implementing `axum::serve::Listener`, so
/// this is the hook point for per-connection socket options that a plain
/// `TcpListener` doesn't expose.
struct NoDelayListener {
    inner: TcpListener,
}

impl axum::serve::Listener for NoDelayListener {
    type Io = TcpStream;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            match self.inner.accept().await {
                Ok((stream, addr)) => {
                    let _ = stream.set_nodelay(true);
                    return (stream, addr);
                }
                Err(err) => {
                    tracing::warn!(%err, "range server accept failed, retrying");
                }
            }
        }
    }

    fn local_addr(&self) -> std::io::Result<Self::Addr> {
        self.inner.local_addr()
    }
}

/// Build the axum router for the range server. Exposed standalone so tests
/// can drive it with `tower::ServiceExt::oneshot` without binding a socket.
pub fn build_router(state: ServerState) -> Router {
    Router::new()
        .route(
            "/stream/{stream_id}",
            get(handler::get_handler).head(handler::head_handler),
        )
        .with_state(state)
}

/// Owns the bound loopback listener and the registration table shared with
/// the orchestration layer.
pub struct RangeServer {
    pub registry: Registry,
    chunk_size: u64,
    seek_prebuf_chunks: u64,
    max_consecutive_failures: u32,
    fetcher: Arc<Fetcher>,
}

impl RangeServer {
    pub fn new(
        fetcher: Arc<Fetcher>,
        chunk_size: u64,
        seek_prebuf_chunks: u64,
        max_consecutive_failures: u32,
    ) -> Self {
        Self {
            registry: Registry::new(),
            chunk_size,
            seek_prebuf_chunks,
            max_consecutive_failures,
            fetcher,
        }
    }

    fn state(&self) -> ServerState {
        ServerState {
            registry: self.registry.clone(),
            fetcher: self.fetcher.clone(),
            chunk_size: self.chunk_size,
            seek_prebuf_chunks: self.seek_prebuf_chunks,
            max_consecutive_failures: self.max_consecutive_failures,
        }
    }

    /// Bind an ephemeral port on `127.0.0.1` and start serving. Returns the
    /// bound port and a shutdown sender the caller uses for graceful
    /// termination (mirroring the daemon binary's `watch`-based shutdown).
    pub async fn serve(&self) -> ServerResult<(u16, watch::Sender<bool>)> {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(e.to_string()))?;
        let port = listener
            .local_addr()
            .map_err(|e| ServerError::Bind(e.to_string()))?
            .port();

        let router = build_router(self.state());
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            let listener = NoDelayListener { inner: listener };
            let server = axum::serve(listener, router).with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            });
            if let Err(err) = server.await {
                tracing::error!(%err, "range server exited with error");
            }
        });

        info!(port, "range server listening on loopback");
        Ok((port, shutdown_tx))
    }
}
