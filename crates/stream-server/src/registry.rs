//! The stream registration table: `stream_id -> {handle, metadata, engine}`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use stream_core::RemoteHandle;
use stream_prefetch::PrefetchEngine;

pub struct RegisteredStream {
    pub stream_id: String,
    pub handle: RemoteHandle,
    pub file_size: u64,
    pub mime_type: String,
    pub dc_id: i32,
    pub engine: Arc<PrefetchEngine>,
}

/// Shared, rarely-mutated table of registered streams.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<Mutex<HashMap<String, Arc<RegisteredStream>>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn register(&self, stream_id: String, stream: RegisteredStream) {
        self.inner.lock().unwrap().insert(stream_id, Arc::new(stream));
    }

    pub fn get(&self, stream_id: &str) -> Option<Arc<RegisteredStream>> {
        self.inner.lock().unwrap().get(stream_id).cloned()
    }

    pub fn remove(&self, stream_id: &str) -> Option<Arc<RegisteredStream>> {
        self.inner.lock().unwrap().remove(stream_id)
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
