//! Errors surfaced by the chunk cache and in-flight registry.

use thiserror::Error;

pub type CacheResult<T> = Result<T, CacheError>;

#[derive(Debug, Error)]
pub enum CacheError {
    /// The in-flight fetch this key was waiting on disappeared without a
    /// result — the leader task panicked or was aborted mid-fetch.
    #[error("in-flight fetch for {stream_id}/{chunk_index} was lost")]
    InFlightLost { stream_id: String, chunk_index: u64 },
}
