//! stream-core — shared types, configuration, and constants.
//!
//! Every other crate in the workspace depends on this one for the data
//! model (`ChunkKey`, `RemoteHandle`, `StreamMeta`) and the tunable
//! `Settings` that govern cache budget, pool size, prefetch depth, and
//! retry behavior.

pub mod config;
pub mod error;
pub mod types;

pub use config::Settings;
pub use error::{CoreError, CoreResult};
pub use types::*;
