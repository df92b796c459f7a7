// lib.rs
//
// imagemill: a bounded image transcoding pipeline.
//
// One call takes a heterogeneous source (bytes, stream, decoded image, or
// path), decodes it, applies a max-fit resize that never upscales, encodes to
// the requested or intrinsic format, optionally hands the result to a
// lossless post-compression stage, and accounts the elapsed time in a shared
// atomic accumulator. Cleanup and accounting run on every exit path.

// jemalloc is not supported on Windows/MSVC, so it is excluded on that platform.
#[cfg(all(feature = "jemalloc", not(target_env = "msvc")))]
#[global_allocator]
static ALLOC: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

pub mod engine;
pub mod error;
pub mod ops;

pub use engine::pipeline::{
    calc_bounded_dimensions, ProcessOptions, ProcessOutput, ProcessQuery, Transcoder,
    TranscoderBuilder,
};
pub use engine::postprocess::{LosslessOptimizer, PostProcess};
pub use engine::registry::{FormatCapability, FormatRegistry};
pub use engine::source::ImageSource;
pub use engine::stats::ProcessingStats;
pub use error::{ErrorCategory, MillError, Result};
pub use ops::{EncodeParams, OutputFormat, DEFAULT_QUALITY};

use image::ImageReader;
use std::io::Cursor;

/// Whether the file name carries an extension the built-in registry supports.
/// Transcoders composed with a custom registry answer through
/// [`Transcoder::is_supported_image`] instead.
pub fn is_supported_image(file_name: &str) -> bool {
    FormatRegistry::builtin().is_supported_image(file_name)
}

/// Header-level metadata, readable without decoding pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    /// Detected container format (lowercase), when recognized.
    pub format: Option<String>,
}

/// Probe dimensions and format from the header bytes only.
///
/// Useful for rejecting oversized inputs before paying for a full decode.
pub fn inspect(bytes: &[u8]) -> Result<ImageInfo> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| MillError::decode_failed(format!("failed to read image header: {e}")))?;
    let format = reader.format().map(|f| format!("{f:?}").to_lowercase());
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| MillError::decode_failed(format!("failed to read dimensions: {e}")))?;
    Ok(ImageInfo {
        width,
        height,
        format,
    })
}

/// Library version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
