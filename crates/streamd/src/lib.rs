//! streamd — orchestration library wiring the session pool, cache,
//! fetcher, prefetch engine, and range server into the host-facing
//! `start_stream`/`stop_stream`/`shutdown` surface.

mod error;
mod orchestrator;

pub use error::{OrchestratorError, OrchestratorResult};
pub use orchestrator::{PartRef, StartStreamRequest, StartStreamResponse, StreamOrchestrator};
