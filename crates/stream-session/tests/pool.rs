use std::time::Duration;

use stream_session::SessionPool;
use stream_transport::MockTransport;

#[tokio::test]
async fn ensure_pool_authenticates_exactly_once() {
    let mock = MockTransport::new();
    let dir = tempfile::tempdir().unwrap();
    let pool = SessionPool::new(Box::new(mock.clone()), dir.path().join("credential.json"));

    pool.ensure_pool(3).await.unwrap();

    assert_eq!(pool.pool_size().await, 3);
    assert_eq!(mock.auth_call_count(), 1);
}

#[tokio::test]
async fn ensure_pool_is_idempotent() {
    let mock = MockTransport::new();
    let dir = tempfile::tempdir().unwrap();
    let pool = SessionPool::new(Box::new(mock.clone()), dir.path().join("credential.json"));

    pool.ensure_pool(3).await.unwrap();
    pool.ensure_pool(3).await.unwrap();
    pool.ensure_pool(2).await.unwrap();

    assert_eq!(pool.pool_size().await, 3);
    assert_eq!(mock.auth_call_count(), 1);
}

#[tokio::test]
async fn growing_the_pool_reuses_the_persisted_credential() {
    let mock = MockTransport::new();
    let dir = tempfile::tempdir().unwrap();
    let pool = SessionPool::new(Box::new(mock.clone()), dir.path().join("credential.json"));

    pool.ensure_pool(1).await.unwrap();
    pool.ensure_pool(4).await.unwrap();

    assert_eq!(pool.pool_size().await, 4);
    assert_eq!(mock.auth_call_count(), 1);
}

#[tokio::test]
async fn acquire_routes_by_chunk_index_modulo_pool_size() {
    let mock = MockTransport::new();
    let dir = tempfile::tempdir().unwrap();
    let pool = SessionPool::new(Box::new(mock.clone()), dir.path().join("credential.json"));
    pool.ensure_pool(3).await.unwrap();

    // chunk_index 0, 3, 6 all route to slot 0 under mod-3 routing; simply
    // assert acquire succeeds for a spread of indices without panicking.
    for idx in [0u64, 1, 2, 3, 4, 5, 100] {
        pool.acquire(idx).await.unwrap();
    }
}

#[tokio::test]
async fn a_new_process_reuses_a_persisted_credential_from_disk() {
    let mock = MockTransport::new();
    let dir = tempfile::tempdir().unwrap();
    let credential_path = dir.path().join("credential.json");

    let pool_a = SessionPool::new(Box::new(mock.clone()), credential_path.clone());
    pool_a.ensure_pool(1).await.unwrap();
    assert_eq!(mock.auth_call_count(), 1);

    // Simulate a fresh process: new pool, same mock backend, same credential file.
    let pool_b = SessionPool::new(Box::new(mock.clone()), credential_path);
    pool_b.ensure_pool(2).await.unwrap();

    assert_eq!(mock.auth_call_count(), 1, "second process must not re-authenticate");
}

#[tokio::test]
async fn rate_limited_first_auth_is_absorbed_and_retried() {
    let mock = MockTransport::new().with_rate_limited_first_auth(1, Duration::from_millis(50));
    let dir = tempfile::tempdir().unwrap();
    let pool = SessionPool::new(Box::new(mock.clone()), dir.path().join("credential.json"));

    pool.ensure_pool(1).await.unwrap();

    assert_eq!(pool.pool_size().await, 1);
    assert_eq!(mock.auth_call_count(), 1);
}

#[tokio::test]
async fn disconnected_slot_is_reconnected_on_next_acquire() {
    let mock = MockTransport::new();
    let dir = tempfile::tempdir().unwrap();
    let pool = SessionPool::new(Box::new(mock.clone()), dir.path().join("credential.json"));
    pool.ensure_pool(1).await.unwrap();

    pool.mark_disconnected(0).await;
    // acquire must transparently reconnect using the persisted credential.
    pool.acquire(0).await.unwrap();
}
