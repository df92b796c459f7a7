// src/error.rs
//
// Unified error handling for imagemill.
//
// Error taxonomy:
// - UserError: invalid request, recoverable by the caller
// - CodecError: decode/resize/encode/post-process failures
// - ResourceLimit: I/O and size limits
// - InternalBug: library bugs (should not happen)

use std::borrow::Cow;
use thiserror::Error;

/// Coarse error classification, used by embedders to pick a retry/report policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Invalid request, recoverable by the caller
    UserError,
    /// Decode/resize/encode/post-process failures
    CodecError,
    /// I/O failures and size limits
    ResourceLimit,
    /// Library bugs (should not happen)
    InternalBug,
}

/// imagemill error types.
///
/// Failures from codec stages carry the original diagnostic; nothing is
/// wrapped or downgraded on the way out of the pipeline.
#[derive(Debug, Error)]
pub enum MillError {
    // Request errors
    #[error("invalid query: {reason}")]
    InvalidQuery { reason: Cow<'static, str> },

    #[error("unsupported source type: {type_name}")]
    UnsupportedSource { type_name: Cow<'static, str> },

    // I/O errors
    #[error("failed to read file '{path}': {source}")]
    FileReadFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to memory-map file '{path}': {source}")]
    MmapFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read source stream: {source}")]
    StreamReadFailed {
        #[source]
        source: std::io::Error,
    },

    // Decode errors
    #[error("unsupported image format: {format}")]
    UnsupportedFormat { format: Cow<'static, str> },

    #[error("failed to decode image: {message}")]
    DecodeFailed { message: Cow<'static, str> },

    #[error("corrupted image data")]
    CorruptedImage,

    // Size limit errors
    #[error("image dimension {dimension} exceeds maximum {max}")]
    DimensionExceedsLimit { dimension: u32, max: u32 },

    #[error("image pixel count {pixels} exceeds maximum {max}")]
    PixelCountExceedsLimit { pixels: u64, max: u64 },

    // Transform errors
    #[error("resize failed ({source_width}x{source_height} -> {target_width}x{target_height}): {message}")]
    ResizeFailed {
        source_width: u32,
        source_height: u32,
        target_width: u32,
        target_height: u32,
        message: Cow<'static, str>,
    },

    // Encode errors
    #[error("failed to encode as {format}: {message}")]
    EncodeFailed {
        format: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    // Post-processing errors
    #[error("post-processing failed for '{extension}': {message}")]
    PostProcessFailed {
        extension: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    // Internal errors
    #[error("internal error: {message}")]
    InternalPanic { message: Cow<'static, str> },
}

impl MillError {
    pub fn invalid_query(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidQuery {
            reason: reason.into(),
        }
    }

    pub fn unsupported_source(type_name: impl Into<Cow<'static, str>>) -> Self {
        Self::UnsupportedSource {
            type_name: type_name.into(),
        }
    }

    pub fn file_read_failed(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::FileReadFailed {
            path: path.into(),
            source,
        }
    }

    pub fn mmap_failed(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::MmapFailed {
            path: path.into(),
            source,
        }
    }

    pub fn stream_read_failed(source: std::io::Error) -> Self {
        Self::StreamReadFailed { source }
    }

    pub fn unsupported_format(format: impl Into<Cow<'static, str>>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    pub fn decode_failed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::DecodeFailed {
            message: message.into(),
        }
    }

    pub fn corrupted_image() -> Self {
        Self::CorruptedImage
    }

    pub fn dimension_exceeds_limit(dimension: u32, max: u32) -> Self {
        Self::DimensionExceedsLimit { dimension, max }
    }

    pub fn pixel_count_exceeds_limit(pixels: u64, max: u64) -> Self {
        Self::PixelCountExceedsLimit { pixels, max }
    }

    pub fn resize_failed(
        source_dims: (u32, u32),
        target_dims: (u32, u32),
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::ResizeFailed {
            source_width: source_dims.0,
            source_height: source_dims.1,
            target_width: target_dims.0,
            target_height: target_dims.1,
            message: message.into(),
        }
    }

    pub fn encode_failed(
        format: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::EncodeFailed {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn post_process_failed(
        extension: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::PostProcessFailed {
            extension: extension.into(),
            message: message.into(),
        }
    }

    pub fn internal_panic(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InternalPanic {
            message: message.into(),
        }
    }

    /// Whether the caller can fix the request and retry.
    pub fn is_recoverable(&self) -> bool {
        match self.category() {
            ErrorCategory::UserError | ErrorCategory::ResourceLimit => true,
            ErrorCategory::CodecError | ErrorCategory::InternalBug => false,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidQuery { .. } | Self::UnsupportedSource { .. } => ErrorCategory::UserError,

            Self::UnsupportedFormat { .. }
            | Self::DecodeFailed { .. }
            | Self::CorruptedImage
            | Self::ResizeFailed { .. }
            | Self::EncodeFailed { .. }
            | Self::PostProcessFailed { .. } => ErrorCategory::CodecError,

            Self::FileReadFailed { .. }
            | Self::MmapFailed { .. }
            | Self::StreamReadFailed { .. }
            | Self::DimensionExceedsLimit { .. }
            | Self::PixelCountExceedsLimit { .. } => ErrorCategory::ResourceLimit,

            Self::InternalPanic { .. } => ErrorCategory::InternalBug,
        }
    }
}

pub type Result<T> = std::result::Result<T, MillError>;
