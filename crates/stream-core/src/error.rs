//! Error types for configuration loading.

use thiserror::Error;

/// Result type alias for `stream-core` operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while loading `stream.toml`.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to read config file {path}: {source}")]
    ReadConfig {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseConfig {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}
