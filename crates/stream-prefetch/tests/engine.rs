use std::sync::Arc;
use std::time::Duration;

use stream_cache::{ChunkCache, InFlightRegistry};
use stream_core::{ChunkKey, RemoteHandle};
use stream_fetch::Fetcher;
use stream_prefetch::PrefetchEngine;
use stream_session::SessionPool;
use stream_transport::MockTransport;

fn handle() -> RemoteHandle {
    RemoteHandle {
        id: 1,
        access_hash: 1,
        file_reference: vec![],
        thumb_tag: None,
    }
}

async fn build_engine(
    total_chunks: u64,
    file_size: u64,
    lookahead_chunks: u64,
    parallel_workers: usize,
) -> (PrefetchEngine, Arc<ChunkCache>, MockTransport) {
    let mock = MockTransport::new();
    mock.register_stream(1, 1, "s1", file_size, "video/mp4", 2);

    let dir = tempfile::tempdir().unwrap();
    let sessions = Arc::new(SessionPool::new(
        Box::new(mock.clone()),
        dir.path().join("credential.json"),
    ));
    sessions.ensure_pool(3).await.unwrap();

    let cache = Arc::new(ChunkCache::new(100 * 1024 * 1024));
    let inflight = Arc::new(InFlightRegistry::new());
    let fetcher = Arc::new(Fetcher::new(
        cache.clone(),
        inflight.clone(),
        sessions,
        1024 * 1024,
        4,
    ));

    let engine = PrefetchEngine::new(
        "s1",
        handle(),
        2,
        file_size,
        total_chunks,
        lookahead_chunks,
        parallel_workers,
        cache.clone(),
        inflight,
        fetcher,
    );

    (engine, cache, mock)
}

#[tokio::test]
async fn workers_fill_the_cache_ahead_of_playback() {
    let (engine, cache, _mock) = build_engine(10, 10 * 1024 * 1024, 250, 4).await;
    engine.start(0);

    tokio::time::sleep(Duration::from_millis(500)).await;

    for idx in 0..10u64 {
        assert!(cache.contains(&ChunkKey::new("s1", idx)), "chunk {idx} not prefetched");
    }

    engine.stop().await;
}

#[tokio::test]
async fn stop_terminates_workers_within_a_second() {
    let (engine, _cache, _mock) = build_engine(10_000, 10_000 * 1024 * 1024, 250, 4).await;
    engine.start(0);

    tokio::time::sleep(Duration::from_millis(100)).await;

    let stopped = tokio::time::timeout(Duration::from_secs(1), engine.stop()).await;
    assert!(stopped.is_ok(), "workers did not terminate within 1s");
}

#[tokio::test]
async fn seek_to_refocuses_the_cursor() {
    let (engine, cache, _mock) = build_engine(1000, 1000 * 1024 * 1024, 250, 2).await;
    engine.start(0);

    engine.seek_to(500);
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(cache.contains(&ChunkKey::new("s1", 500)));

    engine.stop().await;
}

#[tokio::test]
async fn notify_playback_within_lookahead_does_not_reset_cursor() {
    let (engine, cache, _mock) = build_engine(1000, 1000 * 1024 * 1024, 250, 2).await;
    engine.start(0);
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Still near the head; no reset expected, cursor keeps climbing.
    engine.notify_playback(0);
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(cache.contains(&ChunkKey::new("s1", 0)));
    engine.stop().await;
}
