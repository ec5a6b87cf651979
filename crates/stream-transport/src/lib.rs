//! stream-transport — capability-set abstraction over the remote chunked
//! object store.
//!
//! The core crates (`stream-session`, `stream-fetch`, `stream-prefetch`)
//! depend only on the [`RemoteTransport`] trait and [`TransportFactory`],
//! never on a concrete client, so the object store behind them is
//! swappable. This crate ships one implementation: [`mock::MockTransport`],
//! a deterministic fake used throughout the test suite.

pub mod credential;
pub mod error;
pub mod mock;

pub use credential::CredentialBlob;
pub use error::TransportError;
pub use mock::MockTransport;

use async_trait::async_trait;
use bytes::Bytes;
use stream_core::RemoteHandle;

/// The result of resolving a `(chat_id, message_id)` pair to a playable
/// document (spec §4.1 "Resolve").
#[derive(Debug, Clone)]
pub struct ResolvedDocument {
    pub handle: RemoteHandle,
    pub file_size: u64,
    pub mime_type: String,
    pub dc_id: i32,
}

/// One authenticated session against the remote store.
///
/// Implementors are expected to be cheaply `Clone`-able handles over shared
/// state (as [`mock::MockTransport`] is), not the connection itself —
/// reconnecting is modeled as calling `connect_with_credential` again, not
/// as constructing a new value.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Perform a fresh authentication exchange, yielding a credential that
    /// can be persisted and reused by sibling sessions.
    async fn authenticate(&self) -> Result<CredentialBlob, TransportError>;

    /// Establish (or re-establish) a connection using an existing
    /// credential, without repeating the authentication exchange.
    async fn connect_with_credential(
        &self,
        credential: &CredentialBlob,
    ) -> Result<(), TransportError>;

    /// Resolve a `(chat_id, message_id)` pair to its document metadata.
    async fn resolve_document(
        &self,
        chat_id: i64,
        message_id: i64,
    ) -> Result<ResolvedDocument, TransportError>;

    /// Fetch `request_size` bytes starting at `offset` from the document
    /// identified by `handle`, anchored to data center `dc_id`.
    async fn download_chunk(
        &self,
        dc_id: i32,
        handle: &RemoteHandle,
        offset: u64,
        request_size: u32,
    ) -> Result<Bytes, TransportError>;

    /// Cheap liveness probe used by the session pool's health check.
    async fn check_liveness(&self) -> Result<(), TransportError>;
}

/// Produces independent [`RemoteTransport`] sessions for the session pool
/// to hold, one per pool slot.
pub trait TransportFactory: Send + Sync {
    fn new_session(&self) -> Box<dyn RemoteTransport>;
}
