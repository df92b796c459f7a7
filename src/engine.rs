// src/engine.rs
//
// Engine modules: source dispatch, codecs, pipeline orchestration, stats.

pub mod common;
pub mod decoder;
pub mod encoder;
pub mod pipeline;
pub mod postprocess;
pub mod registry;
pub mod source;
pub mod stats;

pub use pipeline::{ProcessOptions, ProcessOutput, ProcessQuery, Transcoder};
pub use source::ImageSource;

/// Maximum accepted width or height, decode and encode side.
pub const MAX_DIMENSION: u32 = 32768;

/// Maximum accepted total pixel count (decompression bomb guard).
pub const MAX_PIXELS: u64 = 100_000_000;
