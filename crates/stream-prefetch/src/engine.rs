//! Prefetch Engine — the per-stream persistent worker set.

use std::sync::Arc;
use std::time::Duration;

use stream_cache::{ChunkCache, InFlightRegistry};
use stream_core::RemoteHandle;
use stream_fetch::Fetcher;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cursor::Cursor;

/// Pause between a worker's reservation attempts when nothing needs
/// fetching.
const IDLE_SLEEP: Duration = Duration::from_millis(30);
/// Pause after every fetch attempt, cooperating with remote-side rate
/// limits the way the source's worker loop does.
const WORKER_COOLDOWN: Duration = Duration::from_millis(30);

struct Shared {
    stream_id: String,
    handle: RemoteHandle,
    dc_id: i32,
    file_size: u64,
    total_chunks: u64,
    lookahead_chunks: u64,
    cursor: Cursor,
    cache: Arc<ChunkCache>,
    inflight: Arc<InFlightRegistry>,
    fetcher: Arc<Fetcher>,
}

/// Owns a stream's background worker pool. Dropped (or `stop()`-ed) by the
/// orchestration layer when a stream is unregistered.
pub struct PrefetchEngine {
    shared: Arc<Shared>,
    parallel_workers: usize,
    shutdown_tx: watch::Sender<bool>,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl PrefetchEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stream_id: impl Into<String>,
        handle: RemoteHandle,
        dc_id: i32,
        file_size: u64,
        total_chunks: u64,
        lookahead_chunks: u64,
        parallel_workers: usize,
        cache: Arc<ChunkCache>,
        inflight: Arc<InFlightRegistry>,
        fetcher: Arc<Fetcher>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                stream_id: stream_id.into(),
                handle,
                dc_id,
                file_size,
                total_chunks,
                lookahead_chunks,
                cursor: Cursor::new(0),
                cache,
                inflight,
                fetcher,
            }),
            parallel_workers,
            shutdown_tx,
            workers: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Launch `parallel_workers` long-lived tasks, starting the cursor at
    /// `from_chunk`.
    pub fn start(&self, from_chunk: u64) {
        self.shared.cursor.seek_to(from_chunk);

        let mut workers = self.workers.lock().unwrap();
        for worker_id in 0..self.parallel_workers {
            let shared = self.shared.clone();
            let shutdown_rx = self.shutdown_tx.subscribe();
            workers.push(tokio::spawn(worker_loop(shared, shutdown_rx, worker_id)));
        }

        info!(
            stream_id = %self.shared.stream_id,
            from_chunk,
            workers = self.parallel_workers,
            "prefetch engine started"
        );
    }

    /// Record the playback cursor; repositions the prefetch cursor if it
    /// has drifted out of the lookahead window.
    pub fn notify_playback(&self, chunk_index: u64) {
        self.shared.cursor.notify_playback(
            chunk_index,
            self.shared.total_chunks,
            self.shared.lookahead_chunks,
        );
    }

    /// An explicit seek: refocus the cursor immediately.
    pub fn seek_to(&self, chunk_index: u64) {
        self.shared.cursor.seek_to(chunk_index);
    }

    /// Stop all workers and wait for them to exit.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        let handles: Vec<JoinHandle<()>> = self.workers.lock().unwrap().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
        info!(stream_id = %self.shared.stream_id, "prefetch engine stopped");
    }
}

async fn worker_loop(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>, worker_id: usize) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        let gen = shared.cursor.seek_generation();
        let next = shared.cursor.next_chunk(
            &shared.cache,
            &shared.inflight,
            &shared.stream_id,
            shared.total_chunks,
            shared.lookahead_chunks,
        );

        match next {
            Some(idx) => {
                shared
                    .fetcher
                    .fetch(&shared.stream_id, &shared.handle, shared.dc_id, idx, shared.file_size)
                    .await;

                if shared.cursor.seek_generation() != gen {
                    debug!(
                        stream_id = %shared.stream_id,
                        worker_id,
                        idx,
                        "abandoning stale prefetch round, cursor moved"
                    );
                }

                if sleep_or_shutdown(WORKER_COOLDOWN, &mut shutdown).await {
                    break;
                }
            }
            None => {
                if sleep_or_shutdown(IDLE_SLEEP, &mut shutdown).await {
                    break;
                }
            }
        }
    }
}

/// Sleep `duration` unless shutdown fires first. Returns `true` if the
/// caller should stop.
async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = shutdown.changed() => *shutdown.borrow(),
    }
}
