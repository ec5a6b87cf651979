//! In-flight fetch deduplication: at most one outstanding remote download
//! per `(stream_id, chunk_index)`.
//!
//! The leading request registers a broadcast channel under the key and
//! becomes responsible for the fetch; every subsequent arrival for the same
//! key subscribes and awaits the leader's result instead of issuing its own
//! download.

use std::collections::HashMap;
use std::sync::Mutex;

use bytes::Bytes;
use stream_core::ChunkKey;
use tokio::sync::broadcast;

use crate::error::{CacheError, CacheResult};

const RESULT_CHANNEL_CAPACITY: usize = 1;

/// Either you are the leader for this key (go fetch, then call
/// [`InFlightRegistry::complete`]) or you are a follower already holding the
/// leader's result channel.
pub enum Lease {
    Leader,
    Follower(broadcast::Receiver<Option<Bytes>>),
}

pub struct InFlightRegistry {
    senders: Mutex<HashMap<ChunkKey, broadcast::Sender<Option<Bytes>>>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self {
            senders: Mutex::new(HashMap::new()),
        }
    }

    /// Register interest in `key`. Returns `Lease::Leader` if no fetch for
    /// this key is currently in flight (caller must fetch and call
    /// `complete`); otherwise returns `Lease::Follower` with a receiver that
    /// resolves once the leader finishes.
    pub fn acquire(&self, key: &ChunkKey) -> Lease {
        let mut senders = self.senders.lock().unwrap();
        if let Some(sender) = senders.get(key) {
            return Lease::Follower(sender.subscribe());
        }
        let (tx, _rx) = broadcast::channel(RESULT_CHANNEL_CAPACITY);
        senders.insert(key.clone(), tx);
        Lease::Leader
    }

    /// Is `key` currently in flight (used by the prefetch scanner to skip
    /// indices someone else is already fetching).
    pub fn contains(&self, key: &ChunkKey) -> bool {
        self.senders.lock().unwrap().contains_key(key)
    }

    /// The leader calls this exactly once with the fetch's outcome, waking
    /// every follower, then removes the in-flight entry so the key returns
    /// to "cached or absent".
    pub fn complete(&self, key: &ChunkKey, result: Option<Bytes>) {
        let sender = self.senders.lock().unwrap().remove(key);
        if let Some(sender) = sender {
            let _ = sender.send(result);
        }
    }
}

impl Default for InFlightRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Await a follower's lease, translating a dropped leader (no send, sender
/// dropped) into [`CacheError::InFlightLost`] instead of panicking.
pub async fn await_follower(
    mut receiver: broadcast::Receiver<Option<Bytes>>,
    key: &ChunkKey,
) -> CacheResult<Option<Bytes>> {
    receiver.recv().await.map_err(|_| CacheError::InFlightLost {
        stream_id: key.stream_id.to_string(),
        chunk_index: key.chunk_index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn key() -> ChunkKey {
        ChunkKey::new("s", 0)
    }

    #[test]
    fn first_arrival_is_leader() {
        let registry = InFlightRegistry::new();
        assert!(matches!(registry.acquire(&key()), Lease::Leader));
    }

    #[test]
    fn second_arrival_is_follower() {
        let registry = InFlightRegistry::new();
        let _lease = registry.acquire(&key());
        assert!(matches!(registry.acquire(&key()), Lease::Follower(_)));
    }

    #[test]
    fn contains_reflects_in_flight_state() {
        let registry = InFlightRegistry::new();
        assert!(!registry.contains(&key()));
        let _lease = registry.acquire(&key());
        assert!(registry.contains(&key()));
        registry.complete(&key(), Some(Bytes::from_static(b"x")));
        assert!(!registry.contains(&key()));
    }

    #[tokio::test]
    async fn followers_observe_leader_result() {
        let registry = Arc::new(InFlightRegistry::new());
        assert!(matches!(registry.acquire(&key()), Lease::Leader));

        let mut followers = Vec::new();
        for _ in 0..20 {
            match registry.acquire(&key()) {
                Lease::Follower(rx) => followers.push(rx),
                Lease::Leader => panic!("expected follower"),
            }
        }

        registry.complete(&key(), Some(Bytes::from_static(b"payload")));

        for rx in followers {
            let result = await_follower(rx, &key()).await.unwrap();
            assert_eq!(result, Some(Bytes::from_static(b"payload")));
        }
    }

    #[tokio::test]
    async fn key_is_acquirable_again_after_completion() {
        let registry = InFlightRegistry::new();
        assert!(matches!(registry.acquire(&key()), Lease::Leader));
        registry.complete(&key(), None);
        assert!(matches!(registry.acquire(&key()), Lease::Leader));
    }
}
