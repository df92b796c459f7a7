// src/engine/postprocess.rs
//
// Optional re-compression of already-encoded output.

use crate::error::{MillError, Result};
use tracing::debug;

/// A stage that may shrink an encoded payload after the codec has run.
///
/// Implementations pick their strategy from the lowercase file extension; the
/// advisory file name is available for strategies keyed on naming conventions.
/// Returning the input unchanged is valid. Errors propagate out of the
/// pipeline unmodified.
pub trait PostProcess: Send + Sync {
    fn compress(&self, data: Vec<u8>, extension: &str, file_name: Option<&str>) -> Result<Vec<u8>>;
}

/// Lossless optimizer backed by oxipng. PNG payloads are re-compressed;
/// every other extension passes through untouched.
pub struct LosslessOptimizer {
    options: oxipng::Options,
}

impl LosslessOptimizer {
    /// `level` is an oxipng preset, 0-6, clamped.
    pub fn new(level: u8) -> Self {
        Self {
            options: oxipng::Options::from_preset(level.min(6)),
        }
    }
}

impl Default for LosslessOptimizer {
    fn default() -> Self {
        Self::new(2)
    }
}

impl PostProcess for LosslessOptimizer {
    fn compress(&self, data: Vec<u8>, extension: &str, _file_name: Option<&str>) -> Result<Vec<u8>> {
        if extension != "png" {
            return Ok(data);
        }
        let before = data.len();
        let optimized = oxipng::optimize_from_memory(&data, &self.options)
            .map_err(|e| MillError::post_process_failed("png", e.to_string()))?;
        debug!(before, after = optimized.len(), "png post-compression");
        Ok(optimized)
    }
}
