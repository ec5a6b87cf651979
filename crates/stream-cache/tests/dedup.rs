//! Integration coverage for the cache + in-flight registry acting together,
//! the way the fetcher crate drives them.

use std::sync::Arc;

use bytes::Bytes;
use stream_cache::{await_follower, ChunkCache, InFlightRegistry, Lease};
use stream_core::ChunkKey;

#[tokio::test]
async fn concurrent_fetchers_coalesce_to_one_underlying_fetch() {
    let registry = Arc::new(InFlightRegistry::new());
    let cache = Arc::new(ChunkCache::new(10 * 1024 * 1024));
    let key = ChunkKey::new("s1", 3);

    let mut leader_count = 0;
    let mut followers = Vec::new();
    for _ in 0..20 {
        match registry.acquire(&key) {
            Lease::Leader => leader_count += 1,
            Lease::Follower(rx) => followers.push(rx),
        }
    }
    assert_eq!(leader_count, 1);
    assert_eq!(followers.len(), 19);

    let payload = Bytes::from(vec![7u8; 1024 * 1024]);
    cache.insert(key.clone(), payload.clone());
    registry.complete(&key, Some(payload.clone()));

    for rx in followers {
        let result = await_follower(rx, &key).await.unwrap();
        assert_eq!(result, Some(payload.clone()));
    }

    assert!(cache.contains(&key));
    assert!(!registry.contains(&key));
}

#[tokio::test]
async fn stop_stream_style_purge_clears_only_target_stream() {
    let cache = Arc::new(ChunkCache::new(10 * 1024 * 1024));
    cache.insert(ChunkKey::new("a", 0), Bytes::from_static(b"a0"));
    cache.insert(ChunkKey::new("a", 1), Bytes::from_static(b"a1"));
    cache.insert(ChunkKey::new("b", 0), Bytes::from_static(b"b0"));

    cache.delete_prefix("a");

    assert!(!cache.contains(&ChunkKey::new("a", 0)));
    assert!(!cache.contains(&ChunkKey::new("a", 1)));
    assert!(cache.contains(&ChunkKey::new("b", 0)));
}
