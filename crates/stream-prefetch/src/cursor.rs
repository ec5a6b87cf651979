//! The single critical section guarding the prefetch cursor.
//!
//! `playback_chunk`, `cursor`, and `seek_generation` are bundled behind one
//! `std::sync::Mutex` so the reservation `idx = cursor; cursor += 1` is
//! exactly one guarded step — no two workers ever return the same index
//! from [`Cursor::next_chunk`].

use std::sync::Mutex;

use stream_cache::{ChunkCache, InFlightRegistry};
use stream_core::ChunkKey;

struct State {
    playback_chunk: u64,
    cursor: u64,
    seek_generation: u64,
}

pub struct Cursor {
    state: Mutex<State>,
}

impl Cursor {
    pub fn new(from_chunk: u64) -> Self {
        Self {
            state: Mutex::new(State {
                playback_chunk: from_chunk,
                cursor: from_chunk,
                seek_generation: 0,
            }),
        }
    }

    pub fn seek_generation(&self) -> u64 {
        self.state.lock().unwrap().seek_generation
    }

    /// Atomically reserve the next index this worker should fetch, skipping
    /// anything already cached or in flight, bounded by the lookahead
    /// window. Returns `None` if nothing needs fetching right now.
    pub fn next_chunk(
        &self,
        cache: &ChunkCache,
        inflight: &InFlightRegistry,
        stream_id: &str,
        total_chunks: u64,
        lookahead_chunks: u64,
    ) -> Option<u64> {
        let mut state = self.state.lock().unwrap();
        let limit = state.playback_chunk + lookahead_chunks;
        let mut scanned = 0u64;

        while state.cursor < total_chunks && state.cursor <= limit && scanned < lookahead_chunks {
            let idx = state.cursor;
            state.cursor += 1;
            scanned += 1;

            let key = ChunkKey::new(stream_id, idx);
            if !cache.contains(&key) && !inflight.contains(&key) {
                return Some(idx);
            }
        }
        None
    }

    /// Record the latest playback position; reposition the cursor if it has
    /// run off the end of the stream or drifted too far ahead.
    pub fn notify_playback(&self, chunk_index: u64, total_chunks: u64, lookahead_chunks: u64) {
        let mut state = self.state.lock().unwrap();
        state.playback_chunk = chunk_index;
        if state.cursor >= total_chunks || state.cursor > chunk_index + lookahead_chunks {
            state.seek_generation += 1;
            state.cursor = chunk_index;
        }
    }

    /// An explicit seek: jump both playback and cursor to `chunk_index`.
    pub fn seek_to(&self, chunk_index: u64) {
        let mut state = self.state.lock().unwrap();
        state.playback_chunk = chunk_index;
        state.cursor = chunk_index;
        state.seek_generation += 1;
    }
}
