//! Errors surfaced by the session pool.

use thiserror::Error;

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Authentication failed for a reason other than rate-limiting — fatal,
    /// surfaced to the host per the error taxonomy.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// `acquire`/`any_connected` called before any session exists.
    #[error("session pool is empty")]
    PoolEmpty,

    /// Reconnecting a disconnected slot failed.
    #[error("reconnect failed: {0}")]
    ReconnectFailed(String),
}
