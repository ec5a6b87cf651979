//! Data model types shared across the streaming cache and range server.
//!
//! See spec §3 (Data Model) for the authoritative definitions; this module
//! is the Rust encoding of those entities.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Identifies one 1 MiB (or shorter, for the tail) slice of a stream.
///
/// Used as the shared key for both the chunk cache and the in-flight
/// registry so that "cached xor in-flight xor absent" (invariant 1) is a
/// property of looking the same key up in two maps, never two different key
/// shapes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkKey {
    pub stream_id: Arc<str>,
    pub chunk_index: u64,
}

impl ChunkKey {
    pub fn new(stream_id: impl Into<Arc<str>>, chunk_index: u64) -> Self {
        Self {
            stream_id: stream_id.into(),
            chunk_index,
        }
    }
}

/// A remote document handle: everything the backing store needs to locate
/// bytes anchored to a data center.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteHandle {
    pub id: i64,
    pub access_hash: i64,
    pub file_reference: Vec<u8>,
    pub thumb_tag: Option<Vec<u8>>,
}

/// A registered playable stream (spec §3 "Stream").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMeta {
    pub stream_id: String,
    pub file_size: u64,
    pub mime_type: String,
    pub handle: RemoteHandle,
    pub dc_id: i32,
}

impl StreamMeta {
    /// Total number of chunks, `ceil(file_size / chunk_size)`.
    pub fn total_chunks(&self, chunk_size: u64) -> u64 {
        total_chunks(self.file_size, chunk_size)
    }

    /// Byte length of a given chunk index: `chunk_size` for every chunk but
    /// the last, whose length is `file_size mod chunk_size` when nonzero.
    pub fn chunk_len(&self, chunk_index: u64, chunk_size: u64) -> u64 {
        chunk_len(self.file_size, chunk_size, chunk_index)
    }

    /// Byte offset of the start of a chunk.
    pub fn chunk_offset(&self, chunk_index: u64, chunk_size: u64) -> u64 {
        chunk_index * chunk_size
    }
}

/// `ceil(file_size / chunk_size)`, with `file_size == 0` yielding zero
/// chunks.
pub fn total_chunks(file_size: u64, chunk_size: u64) -> u64 {
    if file_size == 0 {
        0
    } else {
        file_size.div_ceil(chunk_size)
    }
}

/// Length in bytes of chunk `chunk_index` of a stream of the given size.
pub fn chunk_len(file_size: u64, chunk_size: u64, chunk_index: u64) -> u64 {
    let offset = chunk_index * chunk_size;
    if offset >= file_size {
        return 0;
    }
    (file_size - offset).min(chunk_size)
}
