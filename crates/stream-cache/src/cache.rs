//! Byte-budgeted LRU over `(stream_id, chunk_index) -> bytes`.
//!
//! Recency is tracked with a monotonic sequence counter rather than an
//! intrusive linked list: each entry remembers the sequence number it was
//! last touched at, and a `BTreeMap<u64, ChunkKey>` gives eviction order in
//! `O(log n)` without unsafe pointer juggling.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use bytes::Bytes;
use stream_core::ChunkKey;
use tracing::{trace, warn};

struct Entry {
    bytes: Bytes,
    seq: u64,
}

struct State {
    entries: HashMap<ChunkKey, Entry>,
    recency: BTreeMap<u64, ChunkKey>,
    used_bytes: u64,
    next_seq: u64,
}

impl State {
    fn touch(&mut self, key: &ChunkKey) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.recency.insert(seq, key.clone());
        seq
    }

    fn evict_until_fits(&mut self, incoming_len: u64, max_bytes: u64) {
        while self.used_bytes + incoming_len > max_bytes {
            let Some((&oldest_seq, _)) = self.recency.iter().next() else {
                break;
            };
            let key = self.recency.remove(&oldest_seq).unwrap();
            if let Some(entry) = self.entries.remove(&key) {
                self.used_bytes -= entry.bytes.len() as u64;
                trace!(stream_id = %key.stream_id, chunk_index = key.chunk_index, "evicted chunk");
            }
        }
    }
}

/// Fixed-byte-budget LRU cache of chunk bytes, shared between the Range
/// Server and the Prefetch Engine's workers.
pub struct ChunkCache {
    max_bytes: u64,
    state: Mutex<State>,
}

impl ChunkCache {
    pub fn new(max_bytes: u64) -> Self {
        Self {
            max_bytes,
            state: Mutex::new(State {
                entries: HashMap::new(),
                recency: BTreeMap::new(),
                used_bytes: 0,
                next_seq: 0,
            }),
        }
    }

    /// Look up `key`, promoting it to most-recent on a hit.
    pub fn get(&self, key: &ChunkKey) -> Option<Bytes> {
        let mut state = self.state.lock().unwrap();
        if !state.entries.contains_key(key) {
            return None;
        }
        let new_seq = state.touch(key);
        let entry = state.entries.get_mut(key).unwrap();
        let old_seq = entry.seq;
        entry.seq = new_seq;
        let bytes = entry.bytes.clone();
        state.recency.remove(&old_seq);
        Some(bytes)
    }

    /// Does `key` exist, without affecting recency.
    pub fn contains(&self, key: &ChunkKey) -> bool {
        self.state.lock().unwrap().entries.contains_key(key)
    }

    /// Insert `bytes` under `key`, evicting least-recent entries until the
    /// budget is respected. A single entry larger than `max_bytes` is
    /// rejected silently (logged), matching the policy that a chunk never
    /// exceeds `CHUNK_SIZE` in practice.
    pub fn insert(&self, key: ChunkKey, bytes: Bytes) {
        let len = bytes.len() as u64;
        if len > self.max_bytes {
            warn!(
                stream_id = %key.stream_id,
                chunk_index = key.chunk_index,
                len,
                max_bytes = self.max_bytes,
                "rejecting oversized cache entry"
            );
            return;
        }

        let mut state = self.state.lock().unwrap();
        if let Some(prior) = state.entries.remove(&key) {
            state.used_bytes -= prior.bytes.len() as u64;
            state.recency.remove(&prior.seq);
        }

        state.evict_until_fits(len, self.max_bytes);

        let seq = state.touch(&key);
        state.used_bytes += len;
        state.entries.insert(key, Entry { bytes, seq });
    }

    /// Remove every entry whose key's `stream_id` equals `stream_id`.
    pub fn delete_prefix(&self, stream_id: &str) {
        let mut state = self.state.lock().unwrap();
        let keys: Vec<ChunkKey> = state
            .entries
            .keys()
            .filter(|k| &*k.stream_id == stream_id)
            .cloned()
            .collect();
        for key in keys {
            if let Some(entry) = state.entries.remove(&key) {
                state.used_bytes -= entry.bytes.len() as u64;
                state.recency.remove(&entry.seq);
            }
        }
    }

    /// Remove every entry.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.entries.clear();
        state.recency.clear();
        state.used_bytes = 0;
    }

    /// Current resident bytes. Exposed for tests and metrics.
    pub fn used_bytes(&self) -> u64 {
        self.state.lock().unwrap().used_bytes
    }
}
