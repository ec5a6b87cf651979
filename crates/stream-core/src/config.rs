//! `stream.toml` configuration parsing.
//!
//! Every tunable from spec §6's configuration table is a field of
//! [`Settings`], with [`Default`] matching the table's defaults. A missing
//! `stream.toml` is not an error — callers fall back to [`Settings::default`].

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Bytes per chunk (spec §3 "Chunk"). Not configurable in practice — the
/// remote store only serves whole 1 MiB reads — but kept as a field so
/// tests can shrink it.
pub const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Bytes per chunk.
    pub chunk_size: u64,
    /// Number of authenticated sessions held by the session pool.
    pub client_pool_size: usize,
    /// Prefetch workers per stream.
    pub parallel_workers: usize,
    /// Head chunks pre-fetched before playback starts.
    pub prefetch_chunks: u64,
    /// Tail chunks pre-fetched before playback starts.
    pub tail_chunks: u64,
    /// Burst size on a cache-cold seek.
    pub seek_prebuf_chunks: u64,
    /// Max distance the prefetch cursor may run ahead of playback.
    pub lookahead_chunks: u64,
    /// Byte budget for the chunk cache.
    pub cache_max_bytes: u64,
    /// Per-chunk fetch attempts before giving up.
    pub max_retries: u32,
    /// Consecutive chunk failures before a response is aborted.
    pub max_consecutive_failures: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            client_pool_size: 3,
            parallel_workers: 9,
            prefetch_chunks: 50,
            tail_chunks: 3,
            seek_prebuf_chunks: 10,
            lookahead_chunks: 250,
            cache_max_bytes: 700 * 1024 * 1024,
            max_retries: 4,
            max_consecutive_failures: 5,
        }
    }
}

impl Settings {
    /// Load settings from a `stream.toml`-shaped file, falling back to
    /// defaults for any field the file omits (`#[serde(default)]` on every
    /// field covers this).
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| CoreError::ReadConfig {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| CoreError::ParseConfig {
            path: path.display().to_string(),
            source,
        })
    }

    /// Load settings from `path` if it exists, otherwise return defaults.
    pub fn from_file_or_default(path: &Path) -> CoreResult<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }
}
