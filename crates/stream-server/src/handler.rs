//! The `/stream/{stream_id}` route: HEAD, full GET, and ranged GET.

use std::sync::Arc;

use async_stream::stream;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use stream_core::ChunkKey;
use stream_fetch::Fetcher;
use tracing::{debug, warn};

use crate::range::parse_range;
use crate::registry::{RegisteredStream, Registry};

/// Delay before retrying the same byte position after a fetch failure.
const RETRY_DELAY: std::time::Duration = std::time::Duration::from_millis(500);

#[derive(Clone)]
pub struct ServerState {
    pub registry: Registry,
    pub fetcher: Arc<Fetcher>,
    pub chunk_size: u64,
    /// Burst size on a cache-cold seek (spec.md §4.5 `SEEK_PREBUF_CHUNKS`).
    pub seek_prebuf_chunks: u64,
    /// Consecutive mid-body fetch failures before the response is aborted.
    pub max_consecutive_failures: u32,
}

fn cors_headers(response: &mut Response) {
    response
        .headers_mut()
        .insert("access-control-allow-origin", "*".parse().unwrap());
    response
        .headers_mut()
        .insert("cache-control", "no-cache".parse().unwrap());
    response
        .headers_mut()
        .insert("accept-ranges", "bytes".parse().unwrap());
}

pub async fn head_handler(
    State(state): State<ServerState>,
    Path(stream_id): Path<String>,
) -> Response {
    let Some(stream) = state.registry.get(&stream_id) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header("content-type", stream.mime_type.clone())
        .header("content-length", stream.file_size.to_string())
        .body(Body::empty())
        .unwrap();
    cors_headers(&mut response);
    response
}

pub async fn get_handler(
    State(state): State<ServerState>,
    Path(stream_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let Some(stream) = state.registry.get(&stream_id) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let range = headers
        .get(axum::http::header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| parse_range(v, stream.file_size));

    let (start, end, status) = match range {
        Some((start, end)) => (start, end, StatusCode::PARTIAL_CONTENT),
        None => (0, stream.file_size.saturating_sub(1), StatusCode::OK),
    };

    seek_burst(&state, &stream, start).await;

    let body_len = end - start + 1;
    let mut builder = Response::builder()
        .status(status)
        .header("content-type", stream.mime_type.clone())
        .header("content-length", body_len.to_string());
    if status == StatusCode::PARTIAL_CONTENT {
        builder = builder.header(
            "content-range",
            format!("bytes {start}-{end}/{}", stream.file_size),
        );
    }

    let body_stream = emit_body(state.clone(), stream.clone(), start, end);
    let mut response = builder.body(Body::from_stream(body_stream)).unwrap();
    cors_headers(&mut response);
    response
}

/// Before emitting any body bytes, if the first chunk of the range is not
/// yet cached: refocus the prefetch cursor and synchronously warm every
/// uncached index in the burst window, in parallel.
async fn seek_burst(state: &ServerState, stream: &RegisteredStream, start: u64) {
    let first_chunk = start / state.chunk_size;
    if state
        .fetcher
        .cache_contains(&ChunkKey::new(stream.stream_id.clone(), first_chunk))
    {
        return;
    }

    stream.engine.seek_to(first_chunk);

    let total_chunks = stream_core::total_chunks(stream.file_size, state.chunk_size);
    let burst_end = (first_chunk + state.seek_prebuf_chunks).min(total_chunks);

    let mut tasks = Vec::new();
    for idx in first_chunk..burst_end {
        let fetcher = state.fetcher.clone();
        let handle = stream.handle.clone();
        let dc_id = stream.dc_id;
        let file_size = stream.file_size;
        let stream_id = stream.stream_id.clone();
        tasks.push(tokio::spawn(async move {
            fetcher.fetch(&stream_id, &handle, dc_id, idx, file_size).await
        }));
    }
    for task in tasks {
        let _ = task.await;
    }

    debug!(first_chunk, burst_end, "seek burst complete");
}

fn emit_body(
    state: ServerState,
    stream: Arc<RegisteredStream>,
    start: u64,
    end: u64,
) -> impl futures_core::Stream<Item = Result<Bytes, std::io::Error>> {
    stream! {
        let chunk_size = state.chunk_size;
        let max_consecutive_failures = state.max_consecutive_failures;
        let mut byte_pos = start;
        let mut consecutive_failures = 0u32;

        while byte_pos <= end {
            let chunk_index = byte_pos / chunk_size;
            let offset_in_chunk = byte_pos % chunk_size;

            stream.engine.notify_playback(chunk_index);

            let chunk = state
                .fetcher
                .fetch(&stream.stream_id, &stream.handle, stream.dc_id, chunk_index, stream.file_size)
                .await;

            match chunk {
                Some(bytes) if !bytes.is_empty() => {
                    let available = bytes.len() as u64 - offset_in_chunk;
                    let take = available.min(end + 1 - byte_pos) as usize;
                    let slice = bytes.slice(offset_in_chunk as usize..offset_in_chunk as usize + take);
                    consecutive_failures = 0;
                    byte_pos += take as u64;
                    yield Ok(slice);
                }
                _ => {
                    consecutive_failures += 1;
                    if consecutive_failures >= max_consecutive_failures {
                        warn!(
                            stream_id = %stream.stream_id,
                            byte_pos,
                            "aborting response after too many consecutive fetch failures"
                        );
                        break;
                    }
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            }
        }
    }
}
