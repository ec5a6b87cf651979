//! Chunk Fetcher — the sole writer into the Chunk Cache and the sole
//! participant in the in-flight registry.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use stream_cache::{await_follower, ChunkCache, InFlightRegistry, Lease};
use stream_core::{ChunkKey, RemoteHandle};
use stream_session::SessionPool;
use tracing::{debug, warn};

/// Base delay for the exponential backoff between retry attempts
/// (`200ms * 2^(attempt-1)`, no jitter — see spec's open question on
/// jitter: the source has none, so neither does this).
const RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

pub struct Fetcher {
    cache: Arc<ChunkCache>,
    inflight: Arc<InFlightRegistry>,
    sessions: Arc<SessionPool>,
    chunk_size: u64,
    max_retries: u32,
}

impl Fetcher {
    pub fn new(
        cache: Arc<ChunkCache>,
        inflight: Arc<InFlightRegistry>,
        sessions: Arc<SessionPool>,
        chunk_size: u64,
        max_retries: u32,
    ) -> Self {
        Self {
            cache,
            inflight,
            sessions,
            chunk_size,
            max_retries,
        }
    }

    /// Resolve `chunk_index` of `stream_id`, returning `None` only after
    /// every retry has been exhausted.
    /// Is `key` already resident in the cache — used by the seek-burst
    /// check to decide whether a synchronous pre-buffer is needed.
    pub fn cache_contains(&self, key: &ChunkKey) -> bool {
        self.cache.contains(key)
    }

    pub async fn fetch(
        &self,
        stream_id: &str,
        handle: &RemoteHandle,
        dc_id: i32,
        chunk_index: u64,
        file_size: u64,
    ) -> Option<Bytes> {
        let offset = chunk_index * self.chunk_size;
        if offset >= file_size {
            return Some(Bytes::new());
        }

        let key = ChunkKey::new(stream_id, chunk_index);

        if let Some(bytes) = self.cache.get(&key) {
            return Some(bytes);
        }

        match self.inflight.acquire(&key) {
            Lease::Follower(rx) => match await_follower(rx, &key).await {
                Ok(result) => result,
                Err(err) => {
                    warn!(%err, stream_id, chunk_index, "in-flight lease lost, re-fetching");
                    // Re-acquire: we may now be the leader, or another
                    // follower may have raced us into leadership first.
                    match self.inflight.acquire(&key) {
                        Lease::Leader => {
                            self.lead_fetch(&key, handle, dc_id, chunk_index, offset)
                                .await
                        }
                        Lease::Follower(rx) => await_follower(rx, &key).await.ok().flatten(),
                    }
                }
            },
            Lease::Leader => {
                self.lead_fetch(&key, handle, dc_id, chunk_index, offset)
                    .await
            }
        }
    }

    /// Caller must already hold the leader lease for `key`; this downloads,
    /// populates the cache on success, and always completes the lease.
    async fn lead_fetch(
        &self,
        key: &ChunkKey,
        handle: &RemoteHandle,
        dc_id: i32,
        chunk_index: u64,
        offset: u64,
    ) -> Option<Bytes> {
        let result = self
            .download_with_retry(handle, dc_id, chunk_index, offset)
            .await;

        if let Some(bytes) = &result {
            self.cache.insert(key.clone(), bytes.clone());
        }
        self.inflight.complete(key, result.clone());
        result
    }

    async fn download_with_retry(
        &self,
        handle: &RemoteHandle,
        dc_id: i32,
        chunk_index: u64,
        offset: u64,
    ) -> Option<Bytes> {
        for attempt in 1..=self.max_retries {
            let transport = match self.sessions.acquire(chunk_index + u64::from(attempt) - 1).await
            {
                Ok(transport) => transport,
                Err(err) => {
                    warn!(%err, chunk_index, attempt, "no session available for fetch attempt");
                    self.backoff(attempt).await;
                    continue;
                }
            };

            match transport
                .download_chunk(dc_id, handle, offset, self.chunk_size as u32)
                .await
            {
                Ok(bytes) if !bytes.is_empty() => {
                    debug!(chunk_index, attempt, len = bytes.len(), "chunk downloaded");
                    return Some(bytes);
                }
                Ok(_) => {
                    debug!(chunk_index, attempt, "empty chunk response, retrying");
                }
                Err(err) => {
                    warn!(%err, chunk_index, attempt, "chunk download failed");
                    self.sessions
                        .mark_disconnected(chunk_index + u64::from(attempt) - 1)
                        .await;
                }
            }

            if attempt < self.max_retries {
                self.backoff(attempt).await;
            }
        }

        warn!(chunk_index, max_retries = self.max_retries, "chunk fetch exhausted retries");
        None
    }

    async fn backoff(&self, attempt: u32) {
        let delay = RETRY_BASE_DELAY * 2u32.pow(attempt - 1);
        tokio::time::sleep(delay).await;
    }
}
