//! A deterministic in-memory [`RemoteTransport`] for tests — spec §8's
//! end-to-end scenario table depends on `download_chunk` returning
//! reproducible bytes without a live backend.
//!
//! Chunk bytes are `sha256(stream_id || chunk_index)` repeated to fill the
//! requested length, truncated for the final (possibly short) chunk.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use stream_core::RemoteHandle;

use crate::error::TransportError;
use crate::{CredentialBlob, RemoteTransport, ResolvedDocument, TransportFactory};

struct StreamRecord {
    stream_id: String,
    file_size: u64,
    mime_type: String,
    dc_id: i32,
}

struct Inner {
    documents: HashMap<(i64, i64), RemoteHandle>,
    streams: HashMap<i64, StreamRecord>,
    auth_calls: u64,
    download_calls: HashMap<(String, u64), u64>,
    rate_limited_auths_remaining: u32,
    rate_limit_retry_after: Duration,
    fail_next_connect: bool,
}

/// A shared fake backend. Clone it freely — clones share the same
/// `Arc<Mutex<Inner>>` state, modeling several authenticated sessions
/// against one remote service.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<Inner>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                documents: HashMap::new(),
                streams: HashMap::new(),
                auth_calls: 0,
                download_calls: HashMap::new(),
                rate_limited_auths_remaining: 0,
                rate_limit_retry_after: Duration::from_secs(0),
                fail_next_connect: false,
            })),
        }
    }

    /// Register a playable document. Returns the handle callers would pass
    /// to `resolve_document`/`download_chunk`.
    pub fn register_stream(
        &self,
        chat_id: i64,
        message_id: i64,
        stream_id: impl Into<String>,
        file_size: u64,
        mime_type: impl Into<String>,
        dc_id: i32,
    ) -> RemoteHandle {
        let handle = RemoteHandle {
            id: message_id,
            access_hash: chat_id,
            file_reference: vec![1, 2, 3],
            thumb_tag: None,
        };
        let mut inner = self.inner.lock().unwrap();
        inner
            .documents
            .insert((chat_id, message_id), handle.clone());
        inner.streams.insert(
            handle.id,
            StreamRecord {
                stream_id: stream_id.into(),
                file_size,
                mime_type: mime_type.into(),
                dc_id,
            },
        );
        handle
    }

    /// Make the next N `authenticate()` calls fail with `RateLimited`.
    pub fn with_rate_limited_first_auth(self, n: u32, retry_after: Duration) -> Self {
        let mut inner = self.inner.lock().unwrap();
        inner.rate_limited_auths_remaining = n;
        inner.rate_limit_retry_after = retry_after;
        drop(inner);
        self
    }

    /// Make the next `connect_with_credential` call fail, simulating a
    /// dropped session that the pool must reconnect in place.
    pub fn fail_next_connect(&self) {
        self.inner.lock().unwrap().fail_next_connect = true;
    }

    pub fn auth_call_count(&self) -> u64 {
        self.inner.lock().unwrap().auth_calls
    }

    pub fn download_call_count(&self, stream_id: &str, chunk_index: u64) -> u64 {
        self.inner
            .lock()
            .unwrap()
            .download_calls
            .get(&(stream_id.to_string(), chunk_index))
            .copied()
            .unwrap_or(0)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn chunk_bytes(stream_id: &str, chunk_index: u64, len: usize) -> Bytes {
    let mut hasher = Sha256::new();
    hasher.update(stream_id.as_bytes());
    hasher.update(chunk_index.to_be_bytes());
    let digest = hasher.finalize();

    let mut out = Vec::with_capacity(len);
    while out.len() < len {
        let remaining = len - out.len();
        out.extend_from_slice(&digest[..remaining.min(digest.len())]);
    }
    Bytes::from(out)
}

#[async_trait]
impl RemoteTransport for MockTransport {
    async fn authenticate(&self) -> Result<CredentialBlob, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.rate_limited_auths_remaining > 0 {
            inner.rate_limited_auths_remaining -= 1;
            return Err(TransportError::RateLimited {
                retry_after: inner.rate_limit_retry_after,
            });
        }
        inner.auth_calls += 1;
        Ok(CredentialBlob::new(format!("mock-session-{}", inner.auth_calls)))
    }

    async fn connect_with_credential(
        &self,
        _credential: &CredentialBlob,
    ) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_next_connect {
            inner.fail_next_connect = false;
            return Err(TransportError::ConnectFailed("simulated drop".into()));
        }
        Ok(())
    }

    async fn resolve_document(
        &self,
        chat_id: i64,
        message_id: i64,
    ) -> Result<ResolvedDocument, TransportError> {
        let inner = self.inner.lock().unwrap();
        let handle = inner
            .documents
            .get(&(chat_id, message_id))
            .ok_or(TransportError::DocumentNotFound {
                chat_id,
                message_id,
            })?
            .clone();
        let record = inner.streams.get(&handle.id).expect("registered stream record");
        Ok(ResolvedDocument {
            handle,
            file_size: record.file_size,
            mime_type: record.mime_type.clone(),
            dc_id: record.dc_id,
        })
    }

    async fn download_chunk(
        &self,
        _dc_id: i32,
        handle: &RemoteHandle,
        offset: u64,
        request_size: u32,
    ) -> Result<Bytes, TransportError> {
        let (stream_id, chunk_size, chunk_index) = {
            let inner = self.inner.lock().unwrap();
            let record = inner
                .streams
                .get(&handle.id)
                .ok_or_else(|| TransportError::DownloadFailed("unknown handle".into()))?;
            let chunk_size = request_size as u64;
            (record.stream_id.clone(), chunk_size, offset / chunk_size.max(1))
        };

        let mut inner = self.inner.lock().unwrap();
        *inner
            .download_calls
            .entry((stream_id.clone(), chunk_index))
            .or_insert(0) += 1;
        drop(inner);

        Ok(chunk_bytes(&stream_id, chunk_index, chunk_size as usize))
    }

    async fn check_liveness(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

impl TransportFactory for MockTransport {
    fn new_session(&self) -> Box<dyn RemoteTransport> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_registered_document() {
        let mock = MockTransport::new();
        mock.register_stream(1, 100, "s1", 5 * 1024 * 1024, "video/mp4", 2);

        let resolved = mock.resolve_document(1, 100).await.unwrap();
        assert_eq!(resolved.file_size, 5 * 1024 * 1024);
        assert_eq!(resolved.mime_type, "video/mp4");
        assert_eq!(resolved.dc_id, 2);
    }

    #[tokio::test]
    async fn unregistered_document_is_not_found() {
        let mock = MockTransport::new();
        let err = mock.resolve_document(1, 999).await.unwrap_err();
        assert!(matches!(err, TransportError::DocumentNotFound { .. }));
    }

    #[tokio::test]
    async fn same_chunk_is_byte_identical_across_calls() {
        let mock = MockTransport::new();
        let handle = mock.register_stream(1, 100, "s1", 2 * 1024 * 1024, "video/mp4", 2);

        let a = mock.download_chunk(2, &handle, 0, 1024 * 1024).await.unwrap();
        let b = mock.download_chunk(2, &handle, 0, 1024 * 1024).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 1024 * 1024);
    }

    #[tokio::test]
    async fn different_chunks_differ() {
        let mock = MockTransport::new();
        let handle = mock.register_stream(1, 100, "s1", 3 * 1024 * 1024, "video/mp4", 2);

        let c0 = mock.download_chunk(2, &handle, 0, 1024 * 1024).await.unwrap();
        let c1 = mock
            .download_chunk(2, &handle, 1024 * 1024, 1024 * 1024)
            .await
            .unwrap();
        assert_ne!(c0, c1);
    }

    #[tokio::test]
    async fn download_call_count_tracks_per_chunk() {
        let mock = MockTransport::new();
        let handle = mock.register_stream(1, 100, "s1", 2 * 1024 * 1024, "video/mp4", 2);

        mock.download_chunk(2, &handle, 0, 1024 * 1024).await.unwrap();
        mock.download_chunk(2, &handle, 0, 1024 * 1024).await.unwrap();

        assert_eq!(mock.download_call_count("s1", 0), 2);
        assert_eq!(mock.download_call_count("s1", 1), 0);
    }

    #[tokio::test]
    async fn rate_limited_auth_recovers_after_budget_exhausted() {
        let mock = MockTransport::new().with_rate_limited_first_auth(2, Duration::from_millis(50));

        assert!(matches!(
            mock.authenticate().await.unwrap_err(),
            TransportError::RateLimited { .. }
        ));
        assert!(matches!(
            mock.authenticate().await.unwrap_err(),
            TransportError::RateLimited { .. }
        ));
        assert!(mock.authenticate().await.is_ok());
        assert_eq!(mock.auth_call_count(), 1);
    }

    #[tokio::test]
    async fn fail_next_connect_fires_once() {
        let mock = MockTransport::new();
        let credential = CredentialBlob::new("s");
        mock.fail_next_connect();

        assert!(mock.connect_with_credential(&credential).await.is_err());
        assert!(mock.connect_with_credential(&credential).await.is_ok());
    }
}
