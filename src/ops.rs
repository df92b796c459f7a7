// src/ops.rs
//
// Output format selection and per-format encode parameters.
// The token -> parameter mapping is data; dispatch lives in the encoder.

use image::ImageFormat;

/// Quality applied when a format is requested without one.
pub const DEFAULT_QUALITY: u8 = 90;

/// Output formats this pipeline can explicitly encode to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Png,
    Gif,
    WebP,
}

impl OutputFormat {
    /// Map a requested format token to an output format.
    ///
    /// Matching is case-insensitive. An unrecognized token returns `None`:
    /// the pipeline treats that the same as "no format requested" and keeps
    /// the source's intrinsic format. Callers wanting strict validation can
    /// check for `None` themselves.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Map a decoder-detected format to an encodable one, if any.
    pub fn from_detected(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(Self::Jpeg),
            ImageFormat::Png => Some(Self::Png),
            ImageFormat::Gif => Some(Self::Gif),
            ImageFormat::WebP => Some(Self::WebP),
            _ => None,
        }
    }

    pub fn file_extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::WebP => "webp",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::WebP => "image/webp",
        }
    }
}

/// Resolved encoder parameters for one transcode.
#[derive(Clone, Copy, Debug)]
pub struct EncodeParams {
    pub format: OutputFormat,
    /// 0-100, clamped.
    pub quality: u8,
    /// PNG only: quantize to a 256-color palette image.
    pub indexed_palette: bool,
}

impl EncodeParams {
    /// Resolve an optional format token plus optional quality into encoder
    /// parameters.
    ///
    /// Returns `None` when no token is given, the token is blank, or the
    /// token is unrecognized - all three mean "encode in the source's own
    /// format". Explicit PNG requests enable indexed-palette output.
    pub fn resolve(token: Option<&str>, quality: Option<u8>) -> Option<Self> {
        let token = token?.trim();
        if token.is_empty() {
            return None;
        }
        let format = OutputFormat::from_token(token)?;
        Some(Self {
            format,
            quality: quality.unwrap_or(DEFAULT_QUALITY).min(100),
            indexed_palette: format == OutputFormat::Png,
        })
    }

    /// Parameters for the silent-fallback path: encode in the detected
    /// intrinsic format, or PNG when the codec never reported one.
    pub fn native(detected: Option<ImageFormat>) -> Self {
        let format = detected
            .and_then(OutputFormat::from_detected)
            .unwrap_or(OutputFormat::Png);
        Self {
            format,
            quality: DEFAULT_QUALITY,
            indexed_palette: false,
        }
    }

    pub fn with_indexed_palette(mut self, indexed: bool) -> Self {
        self.indexed_palette = indexed;
        self
    }
}
