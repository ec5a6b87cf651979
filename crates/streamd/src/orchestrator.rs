//! Stream orchestration — the public surface a host application drives:
//! `start_stream`, `stop_stream`, `shutdown`.

use std::collections::HashMap;
use std::sync::Arc;

use stream_cache::{ChunkCache, InFlightRegistry};
use stream_core::{total_chunks, RemoteHandle, Settings};
use stream_fetch::Fetcher;
use stream_prefetch::PrefetchEngine;
use stream_server::{RangeServer, RegisteredStream};
use stream_session::SessionPool;
use stream_transport::TransportFactory;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use crate::error::{OrchestratorError, OrchestratorResult};

/// One message backing part of a document, spec §6's `parts: [{message_id}]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartRef {
    pub message_id: i64,
}

/// Everything the host supplies to describe a stream it wants served.
///
/// `api_id`, `api_hash`, and `bot_token` are carried through unchanged to
/// match the orchestration surface's external contract; this workspace's
/// only `TransportFactory` is [`stream_transport::MockTransport`], which
/// ignores them, but a production transport would consume them to build
/// its authentication exchange.
#[derive(Debug, Clone)]
pub struct StartStreamRequest {
    pub stream_id: String,
    pub chat_id: i64,
    pub message_id: i64,
    pub api_id: i32,
    pub api_hash: String,
    pub bot_token: String,
    /// Overrides the resolved MIME type when the host already knows it,
    /// skipping the (generally unreliable) server-reported value.
    pub mime_type: Option<String>,
    /// Overrides the resolved file size when the host already knows it.
    pub total_size: Option<u64>,
    /// Spec §6's `parts: [{message_id}]`. This core's Stream entity (§3)
    /// binds exactly one `remote_handle` per stream, so only a single part
    /// is supported: an empty `parts` is treated as "use `message_id`
    /// above", and a non-empty one must contain exactly one entry whose
    /// `message_id` matches it. Reconstructing one stream by concatenating
    /// several documents is metadata discovery beyond resolving one
    /// document to its streaming handle — out of scope per §1 Non-goals.
    pub parts: Vec<PartRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartStreamResponse {
    pub url: String,
    pub port: u16,
}

struct ActiveStream {
    engine: Arc<PrefetchEngine>,
}

/// Owns the process-wide session pool, cache, fetcher, and range server,
/// and tracks which streams are currently registered against them.
///
/// Constructed once per process; `start_stream`/`stop_stream` may be called
/// repeatedly and concurrently for distinct `stream_id`s.
pub struct StreamOrchestrator {
    settings: Settings,
    sessions: Arc<SessionPool>,
    cache: Arc<ChunkCache>,
    inflight: Arc<InFlightRegistry>,
    fetcher: Arc<Fetcher>,
    range_server: RangeServer,
    range_server_port: Mutex<Option<(u16, watch::Sender<bool>)>>,
    streams: Mutex<HashMap<String, ActiveStream>>,
}

impl StreamOrchestrator {
    pub fn new(
        settings: Settings,
        factory: Box<dyn TransportFactory>,
        credential_path: std::path::PathBuf,
    ) -> Self {
        let sessions = Arc::new(SessionPool::new(factory, credential_path));
        let cache = Arc::new(ChunkCache::new(settings.cache_max_bytes));
        let inflight = Arc::new(InFlightRegistry::new());
        let fetcher = Arc::new(Fetcher::new(
            cache.clone(),
            inflight.clone(),
            sessions.clone(),
            settings.chunk_size,
            settings.max_retries,
        ));
        let range_server = RangeServer::new(
            fetcher.clone(),
            settings.chunk_size,
            settings.seek_prebuf_chunks,
            settings.max_consecutive_failures,
        );

        Self {
            settings,
            sessions,
            cache,
            inflight,
            fetcher,
            range_server,
            range_server_port: Mutex::new(None),
            streams: Mutex::new(HashMap::new()),
        }
    }

    async fn ensure_range_server(&self) -> OrchestratorResult<u16> {
        let mut guard = self.range_server_port.lock().await;
        if let Some((port, _)) = guard.as_ref() {
            return Ok(*port);
        }
        let (port, shutdown_tx) = self
            .range_server
            .serve()
            .await
            .map_err(|e| OrchestratorError::Setup(e.to_string()))?;
        *guard = Some((port, shutdown_tx));
        Ok(port)
    }

    /// Bring up everything needed to serve `request.stream_id` and return
    /// its loopback URL. Idempotent per `stream_id`: re-requesting an
    /// already-registered stream id is rejected rather than silently
    /// double-registering.
    pub async fn start_stream(
        &self,
        request: StartStreamRequest,
    ) -> OrchestratorResult<StartStreamResponse> {
        if self.streams.lock().await.contains_key(&request.stream_id) {
            return Err(OrchestratorError::AlreadyRegistered(request.stream_id));
        }

        self.sessions
            .ensure_pool(self.settings.client_pool_size)
            .await
            .map_err(|e| OrchestratorError::Setup(e.to_string()))?;

        let port = self.ensure_range_server().await?;

        match request.parts.as_slice() {
            [] => {}
            [single] if single.message_id == request.message_id => {}
            _ => {
                return Err(OrchestratorError::Setup(format!(
                    "stream {} requests {} parts, but only a single part matching message_id {} is supported",
                    request.stream_id,
                    request.parts.len(),
                    request.message_id,
                )));
            }
        }

        let session = self
            .sessions
            .any_connected()
            .await
            .map_err(|e| OrchestratorError::Setup(e.to_string()))?;
        let resolved = session
            .resolve_document(request.chat_id, request.message_id)
            .await
            .map_err(|e| OrchestratorError::Setup(e.to_string()))?;

        let file_size = request.total_size.unwrap_or(resolved.file_size);
        let mime_type = request.mime_type.clone().unwrap_or(resolved.mime_type);

        let total_chunks = total_chunks(file_size, self.settings.chunk_size);
        self.warm_head_and_tail(
            &request.stream_id,
            &resolved.handle,
            resolved.dc_id,
            file_size,
            total_chunks,
        )
        .await;

        let engine = Arc::new(PrefetchEngine::new(
            request.stream_id.clone(),
            resolved.handle.clone(),
            resolved.dc_id,
            file_size,
            total_chunks,
            self.settings.lookahead_chunks,
            self.settings.parallel_workers,
            self.cache.clone(),
            self.inflight.clone(),
            self.fetcher.clone(),
        ));
        engine.start(self.settings.prefetch_chunks.min(total_chunks));

        self.range_server.registry.register(
            request.stream_id.clone(),
            RegisteredStream {
                stream_id: request.stream_id.clone(),
                handle: resolved.handle,
                file_size,
                mime_type,
                dc_id: resolved.dc_id,
                engine: engine.clone(),
            },
        );
        self.streams
            .lock()
            .await
            .insert(request.stream_id.clone(), ActiveStream { engine });

        info!(stream_id = %request.stream_id, port, "stream started");
        Ok(StartStreamResponse {
            url: format!("http://127.0.0.1:{port}/stream/{}", request.stream_id),
            port,
        })
    }

    /// Pre-fetch the head (`prefetch_chunks`) and tail (`tail_chunks`)
    /// windows in parallel, using the same parallelism as the prefetch
    /// workers, before the stream is registered and reachable.
    async fn warm_head_and_tail(
        &self,
        stream_id: &str,
        handle: &RemoteHandle,
        dc_id: i32,
        file_size: u64,
        total_chunks: u64,
    ) {
        let head_end = self.settings.prefetch_chunks.min(total_chunks);
        let tail_start = total_chunks.saturating_sub(self.settings.tail_chunks);

        let indices: Vec<u64> = (0..head_end).chain(tail_start..total_chunks).collect();
        let mut joins = Vec::with_capacity(indices.len());
        for idx in indices {
            let fetcher = self.fetcher.clone();
            let handle = handle.clone();
            let stream_id = stream_id.to_string();
            joins.push(tokio::spawn(async move {
                fetcher.fetch(&stream_id, &handle, dc_id, idx, file_size).await
            }));
        }
        for join in joins {
            let _ = join.await;
        }
    }

    /// Terminate a stream's prefetch workers, remove it from the range
    /// server's registry, and purge its cached chunks.
    pub async fn stop_stream(&self, stream_id: &str) -> OrchestratorResult<()> {
        let active = self
            .streams
            .lock()
            .await
            .remove(stream_id)
            .ok_or_else(|| OrchestratorError::UnknownStream(stream_id.to_string()))?;

        active.engine.stop().await;
        self.range_server.registry.remove(stream_id);
        self.cache.delete_prefix(stream_id);

        info!(stream_id, "stream stopped");
        Ok(())
    }

    /// Stop every active stream, clear the cache, close the range server,
    /// and disconnect all sessions. Awaits full task teardown before
    /// returning.
    pub async fn shutdown(&self) {
        let stream_ids: Vec<String> = self.streams.lock().await.keys().cloned().collect();
        for stream_id in stream_ids {
            if let Err(err) = self.stop_stream(&stream_id).await {
                warn!(%err, stream_id, "error stopping stream during shutdown");
            }
        }

        self.cache.clear();

        if let Some((_, shutdown_tx)) = self.range_server_port.lock().await.take() {
            let _ = shutdown_tx.send(true);
        }

        self.sessions.disconnect_all().await;
        info!("orchestrator shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stream_transport::MockTransport;

    fn settings() -> Settings {
        Settings {
            chunk_size: 1024 * 1024,
            client_pool_size: 2,
            parallel_workers: 2,
            prefetch_chunks: 4,
            tail_chunks: 2,
            seek_prebuf_chunks: 4,
            lookahead_chunks: 16,
            cache_max_bytes: 64 * 1024 * 1024,
            max_retries: 3,
            max_consecutive_failures: 5,
        }
    }

    fn request(stream_id: &str) -> StartStreamRequest {
        StartStreamRequest {
            stream_id: stream_id.to_string(),
            chat_id: 1,
            message_id: 100,
            api_id: 1,
            api_hash: "hash".to_string(),
            bot_token: "token".to_string(),
            mime_type: None,
            total_size: None,
            parts: Vec::new(),
        }
    }

    #[tokio::test]
    async fn start_stream_registers_and_returns_reachable_url() {
        let mock = MockTransport::new();
        mock.register_stream(1, 100, "s1", 10 * 1024 * 1024, "video/mp4", 2);
        let dir = tempfile::tempdir().unwrap();

        let orchestrator = StreamOrchestrator::new(
            settings(),
            Box::new(mock),
            dir.path().join("credential.json"),
        );

        let response = orchestrator.start_stream(request("s1")).await.unwrap();
        assert!(response.url.contains("/stream/s1"));
        assert!(response.url.contains(&response.port.to_string()));
        assert_ne!(response.port, 0);

        orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn starting_an_already_registered_stream_is_rejected() {
        let mock = MockTransport::new();
        mock.register_stream(1, 100, "s1", 2 * 1024 * 1024, "video/mp4", 2);
        let dir = tempfile::tempdir().unwrap();

        let orchestrator = StreamOrchestrator::new(
            settings(),
            Box::new(mock),
            dir.path().join("credential.json"),
        );

        orchestrator.start_stream(request("s1")).await.unwrap();
        let err = orchestrator.start_stream(request("s1")).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::AlreadyRegistered(_)));

        orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn stop_stream_purges_cache_and_unregisters() {
        let mock = MockTransport::new();
        mock.register_stream(1, 100, "s1", 2 * 1024 * 1024, "video/mp4", 2);
        let dir = tempfile::tempdir().unwrap();

        let orchestrator = StreamOrchestrator::new(
            settings(),
            Box::new(mock),
            dir.path().join("credential.json"),
        );

        orchestrator.start_stream(request("s1")).await.unwrap();
        assert!(orchestrator.cache.used_bytes() > 0);

        orchestrator.stop_stream("s1").await.unwrap();
        assert_eq!(orchestrator.cache.used_bytes(), 0);
        assert!(orchestrator.range_server.registry.get("s1").is_none());

        orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn stopping_an_unknown_stream_is_an_error() {
        let mock = MockTransport::new();
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = StreamOrchestrator::new(
            settings(),
            Box::new(mock),
            dir.path().join("credential.json"),
        );

        let err = orchestrator.stop_stream("nope").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::UnknownStream(_)));
    }

    #[tokio::test]
    async fn shutdown_stops_every_active_stream() {
        let mock = MockTransport::new();
        mock.register_stream(1, 100, "s1", 2 * 1024 * 1024, "video/mp4", 2);
        mock.register_stream(1, 101, "s2", 2 * 1024 * 1024, "video/mp4", 2);
        let dir = tempfile::tempdir().unwrap();

        let orchestrator = StreamOrchestrator::new(
            settings(),
            Box::new(mock),
            dir.path().join("credential.json"),
        );

        orchestrator.start_stream(request("s1")).await.unwrap();
        let mut req2 = request("s2");
        req2.message_id = 101;
        orchestrator.start_stream(req2).await.unwrap();

        orchestrator.shutdown().await;
        assert_eq!(orchestrator.cache.used_bytes(), 0);
    }

    #[tokio::test]
    async fn total_size_and_mime_type_overrides_take_precedence_over_resolved_metadata() {
        let mock = MockTransport::new();
        mock.register_stream(1, 100, "s1", 2 * 1024 * 1024, "video/mp4", 2);
        let dir = tempfile::tempdir().unwrap();

        let orchestrator = StreamOrchestrator::new(
            settings(),
            Box::new(mock),
            dir.path().join("credential.json"),
        );

        let mut req = request("s1");
        req.total_size = Some(5 * 1024 * 1024);
        req.mime_type = Some("application/octet-stream".to_string());
        orchestrator.start_stream(req).await.unwrap();

        let registered = orchestrator.range_server.registry.get("s1").unwrap();
        assert_eq!(registered.file_size, 5 * 1024 * 1024);
        assert_eq!(registered.mime_type, "application/octet-stream");

        orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn a_single_matching_part_is_accepted() {
        let mock = MockTransport::new();
        mock.register_stream(1, 100, "s1", 2 * 1024 * 1024, "video/mp4", 2);
        let dir = tempfile::tempdir().unwrap();

        let orchestrator = StreamOrchestrator::new(
            settings(),
            Box::new(mock),
            dir.path().join("credential.json"),
        );

        let mut req = request("s1");
        req.parts = vec![PartRef { message_id: 100 }];
        orchestrator.start_stream(req).await.unwrap();

        orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn multiple_parts_are_rejected() {
        let mock = MockTransport::new();
        mock.register_stream(1, 100, "s1", 2 * 1024 * 1024, "video/mp4", 2);
        let dir = tempfile::tempdir().unwrap();

        let orchestrator = StreamOrchestrator::new(
            settings(),
            Box::new(mock),
            dir.path().join("credential.json"),
        );

        let mut req = request("s1");
        req.parts = vec![PartRef { message_id: 100 }, PartRef { message_id: 101 }];
        let err = orchestrator.start_stream(req).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Setup(_)));

        orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn a_mismatched_single_part_is_rejected() {
        let mock = MockTransport::new();
        mock.register_stream(1, 100, "s1", 2 * 1024 * 1024, "video/mp4", 2);
        let dir = tempfile::tempdir().unwrap();

        let orchestrator = StreamOrchestrator::new(
            settings(),
            Box::new(mock),
            dir.path().join("credential.json"),
        );

        let mut req = request("s1");
        req.parts = vec![PartRef { message_id: 999 }];
        let err = orchestrator.start_stream(req).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Setup(_)));

        orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn reusing_the_range_server_across_streams_shares_one_port() {
        let mock = MockTransport::new();
        mock.register_stream(1, 100, "s1", 2 * 1024 * 1024, "video/mp4", 2);
        mock.register_stream(1, 101, "s2", 2 * 1024 * 1024, "video/mp4", 2);
        let dir = tempfile::tempdir().unwrap();

        let orchestrator = StreamOrchestrator::new(
            settings(),
            Box::new(mock),
            dir.path().join("credential.json"),
        );

        let r1 = orchestrator.start_stream(request("s1")).await.unwrap();
        let mut req2 = request("s2");
        req2.message_id = 101;
        let r2 = orchestrator.start_stream(req2).await.unwrap();

        assert_eq!(r1.port, r2.port);
        orchestrator.shutdown().await;
    }
}
