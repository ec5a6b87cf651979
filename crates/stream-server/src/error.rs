//! Errors surfaced by the range server's setup path (not the per-request
//! handlers, which convert failures into status codes or a silent close).

use thiserror::Error;

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind loopback socket: {0}")]
    Bind(String),
}
