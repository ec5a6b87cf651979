//! stream-fetch — resolves one chunk from the remote store through the
//! session pool, with retry, backoff, session rotation, and deduplication
//! of concurrent requests for the same chunk.

mod fetcher;

pub use fetcher::Fetcher;
