//! Errors surfaced by a [`crate::RemoteTransport`] implementation.

use std::time::Duration;

use thiserror::Error;

/// Errors a transport session can report. Per spec §7's taxonomy:
/// `RateLimited` is recoverable-external (absorbed by the session pool),
/// `ConnectFailed`/`DownloadFailed` are recoverable-internal (retried by the
/// fetcher), and `AuthFailed` is fatal (surfaced to the host).
#[derive(Debug, Error, Clone)]
pub enum TransportError {
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("connection failed: {0}")]
    ConnectFailed(String),

    #[error("document not found for chat {chat_id} message {message_id}")]
    DocumentNotFound { chat_id: i64, message_id: i64 },

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("io error: {0}")]
    Io(String),
}
