//! stream-prefetch — the per-stream worker pool that keeps the chunk cache
//! filled ahead of the playback cursor.

mod cursor;
mod engine;

pub use cursor::Cursor;
pub use engine::PrefetchEngine;
