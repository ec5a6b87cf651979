//! Errors the orchestration surface returns synchronously from
//! `start_stream`/`stop_stream` (spec's "setup errors surfaced
//! synchronously" propagation rule).

use thiserror::Error;

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("stream {0} is already registered")]
    AlreadyRegistered(String),

    #[error("stream {0} is not registered")]
    UnknownStream(String),

    #[error("stream setup failed: {0}")]
    Setup(String),
}
