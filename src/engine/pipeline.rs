// src/engine/pipeline.rs
//
// Transcode orchestration: validate -> load -> resize -> select -> encode ->
// post-process -> assemble, with stats accounting guaranteed on every exit
// path.

use crate::engine::encoder;
use crate::engine::postprocess::{LosslessOptimizer, PostProcess};
use crate::engine::registry::FormatRegistry;
use crate::engine::source::ImageSource;
use crate::engine::stats::ProcessingStats;
use crate::error::{MillError, Result};
use crate::ops::{EncodeParams, OutputFormat};
use fast_image_resize::{self as fir, MulDiv, PixelType, ResizeOptions};
use image::{DynamicImage, RgbImage, RgbaImage};
use rayon::prelude::*;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Per-call knobs. Everything except the source itself.
#[derive(Clone, Debug, Default)]
pub struct ProcessOptions {
    /// Upper bound on output width; absent means unbounded.
    pub max_width: Option<u32>,
    /// Upper bound on output height; absent means unbounded.
    pub max_height: Option<u32>,
    /// Requested output format token, matched case-insensitively. Absent or
    /// unrecognized keeps the source's intrinsic format.
    pub format: Option<String>,
    /// Encode quality 0-100; defaults to 90 when a format is requested.
    pub quality: Option<u8>,
    /// Hand the encoded bytes to the post-processor before returning.
    pub execute_post_processor: bool,
    /// Release the caller-supplied source at call end instead of handing
    /// shareable variants back in the output.
    pub dispose_source: bool,
    /// Advisory name for the post-processor's strategy selection.
    pub file_name: Option<String>,
}

/// One transcode request. Immutable for the duration of the call.
#[derive(Debug)]
pub struct ProcessQuery {
    pub source: ImageSource,
    pub options: ProcessOptions,
}

impl ProcessQuery {
    pub fn new(source: ImageSource) -> Self {
        Self {
            source,
            options: ProcessOptions::default(),
        }
    }

    pub fn max_width(mut self, width: u32) -> Self {
        self.options.max_width = Some(width);
        self
    }

    pub fn max_height(mut self, height: u32) -> Self {
        self.options.max_height = Some(height);
        self
    }

    pub fn format(mut self, token: impl Into<String>) -> Self {
        self.options.format = Some(token.into());
        self
    }

    pub fn quality(mut self, quality: u8) -> Self {
        self.options.quality = Some(quality);
        self
    }

    pub fn post_process(mut self, execute: bool) -> Self {
        self.options.execute_post_processor = execute;
        self
    }

    pub fn dispose_source(mut self, dispose: bool) -> Self {
        self.options.dispose_source = dispose;
        self
    }

    pub fn file_name(mut self, name: impl Into<String>) -> Self {
        self.options.file_name = Some(name.into());
        self
    }

    /// Precondition check, run before any codec work or timing starts.
    pub fn validate(&self) -> Result<()> {
        if self.source.is_empty() {
            return Err(MillError::invalid_query("source contains no data"));
        }
        Ok(())
    }
}

/// The assembled result of one transcode. Ownership transfers to the caller;
/// the pipeline retains nothing.
#[derive(Debug)]
pub struct ProcessOutput {
    /// The options this output was produced under.
    pub options: ProcessOptions,
    /// The surviving source handle, present only when `dispose_source` was
    /// false and the variant is shareable (bytes, path).
    pub source: Option<ImageSource>,
    /// Dimensions as decoded, before any resize.
    pub source_width: u32,
    pub source_height: u32,
    /// Dimensions after resize; equal to the source dimensions when no
    /// resize occurred.
    pub width: u32,
    pub height: u32,
    /// Derived from the format the encoder actually chose.
    pub file_extension: &'static str,
    pub mime_type: &'static str,
    /// Wall-clock duration of this call only.
    pub process_time_ms: u64,
    /// The encoded (and possibly post-processed) output.
    pub data: Vec<u8>,
}

impl ProcessOutput {
    /// The output as a readable stream positioned at its start.
    pub fn into_reader(self) -> Cursor<Vec<u8>> {
        Cursor::new(self.data)
    }
}

/// Target dimensions for a max-fit resize into a `max_width` x `max_height`
/// box, where 0 means unbounded on that axis.
///
/// The image is scaled down to fit entirely inside the box, preserving
/// aspect ratio, and is never scaled up: a box larger than the source leaves
/// the dimensions untouched.
pub fn calc_bounded_dimensions(
    src_width: u32,
    src_height: u32,
    max_width: u32,
    max_height: u32,
) -> (u32, u32) {
    if src_width == 0 || src_height == 0 {
        return (src_width, src_height);
    }
    let scale_w = if max_width == 0 {
        f64::INFINITY
    } else {
        max_width as f64 / src_width as f64
    };
    let scale_h = if max_height == 0 {
        f64::INFINITY
    } else {
        max_height as f64 / src_height as f64
    };
    let scale = scale_w.min(scale_h);
    if !scale.is_finite() || scale >= 1.0 {
        return (src_width, src_height);
    }
    let width = ((src_width as f64 * scale).round() as u32).max(1);
    let height = ((src_height as f64 * scale).round() as u32).max(1);
    (width, height)
}

/// Resample to exact target dimensions with fast_image_resize (Lanczos3),
/// premultiplying alpha for layouts that carry it.
pub fn resize_to(img: DynamicImage, dst_width: u32, dst_height: u32) -> Result<DynamicImage> {
    let src_width = img.width();
    let src_height = img.height();
    let fail = move |message: String| {
        MillError::resize_failed((src_width, src_height), (dst_width, dst_height), message)
    };

    if src_width == 0 || src_height == 0 || dst_width == 0 || dst_height == 0 {
        return Err(fail("zero dimension".into()));
    }

    // Rgb8/Rgba8 hand their buffers over without a copy; everything else is
    // converted to RGBA first.
    let (pixel_type, pixels): (PixelType, Vec<u8>) = match img {
        DynamicImage::ImageRgb8(rgb) => (PixelType::U8x3, rgb.into_raw()),
        DynamicImage::ImageRgba8(rgba) => (PixelType::U8x4, rgba.into_raw()),
        other => (PixelType::U8x4, other.to_rgba8().into_raw()),
    };

    let mut src = fir::images::Image::from_vec_u8(src_width, src_height, pixels, pixel_type)
        .map_err(|e| fail(format!("source buffer: {e:?}")))?;
    let mut dst = fir::images::Image::new(dst_width, dst_height, pixel_type);

    let alpha = MulDiv::default();
    if pixel_type == PixelType::U8x4 {
        alpha
            .multiply_alpha_inplace(&mut src)
            .map_err(|e| fail(format!("premultiply: {e}")))?;
    }

    let options = ResizeOptions::new().resize_alg(fir::ResizeAlg::Convolution(
        fir::FilterType::Lanczos3,
    ));
    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src, &mut dst, &options)
        .map_err(|e| fail(format!("resample: {e:?}")))?;

    if pixel_type == PixelType::U8x4 {
        alpha
            .divide_alpha_inplace(&mut dst)
            .map_err(|e| fail(format!("unpremultiply: {e}")))?;
    }

    let out = dst.into_vec();
    match pixel_type {
        PixelType::U8x3 => {
            RgbImage::from_raw(dst_width, dst_height, out).map(DynamicImage::ImageRgb8)
        }
        PixelType::U8x4 => {
            RgbaImage::from_raw(dst_width, dst_height, out).map(DynamicImage::ImageRgba8)
        }
        _ => None,
    }
    .ok_or_else(|| fail("output buffer size mismatch".into()))
}

/// Guarantees the stats update on every exit path. The success path consumes
/// the guard through `finish` so the recorded and reported durations are the
/// same value; an early return via `?` records through `Drop` instead.
struct StatsGuard<'a> {
    stats: &'a ProcessingStats,
    start: Instant,
    armed: bool,
}

impl<'a> StatsGuard<'a> {
    fn start(stats: &'a ProcessingStats) -> Self {
        Self {
            stats,
            start: Instant::now(),
            armed: true,
        }
    }

    fn finish(mut self) -> u64 {
        self.armed = false;
        let elapsed_ms = self.start.elapsed().as_millis() as u64;
        self.stats.add_ms(elapsed_ms);
        elapsed_ms
    }
}

impl Drop for StatsGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.stats.add_ms(self.start.elapsed().as_millis() as u64);
        }
    }
}

struct StageResult {
    source_width: u32,
    source_height: u32,
    width: u32,
    height: u32,
    format: OutputFormat,
    data: Vec<u8>,
}

/// The transcode pipeline.
///
/// Cheap to share across threads: the registry is read-only and the stats
/// accumulator is atomic. Each call is synchronous and blocking; concurrency
/// exists only across independent calls.
pub struct Transcoder {
    registry: FormatRegistry,
    stats: Arc<ProcessingStats>,
    post_processor: Arc<dyn PostProcess>,
}

impl Default for Transcoder {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Transcoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> TranscoderBuilder {
        TranscoderBuilder::default()
    }

    /// Whether the file name carries an extension the registry supports.
    pub fn is_supported_image(&self, file_name: &str) -> bool {
        self.registry.is_supported_image(file_name)
    }

    /// Cumulative elapsed milliseconds across all invocations on this
    /// transcoder's stats instance.
    pub fn total_processing_time_ms(&self) -> u64 {
        self.stats.total_ms()
    }

    pub fn stats(&self) -> Arc<ProcessingStats> {
        Arc::clone(&self.stats)
    }

    pub fn registry(&self) -> &FormatRegistry {
        &self.registry
    }

    /// Run the full pipeline for one query.
    ///
    /// Validation failures return before the timer starts and contribute
    /// nothing to the stats. Once the timer is running, every exit path -
    /// success or failure - releases the consumed source and records the
    /// elapsed time exactly once. Errors from the stages propagate unchanged.
    pub fn process(&self, query: ProcessQuery) -> Result<ProcessOutput> {
        query.validate()?;
        let ProcessQuery { source, options } = query;
        let retained = if options.dispose_source {
            None
        } else {
            source.try_share()
        };

        let guard = StatsGuard::start(&self.stats);
        let staged = self.execute(source, &options)?;
        let process_time_ms = guard.finish();

        Ok(ProcessOutput {
            source_width: staged.source_width,
            source_height: staged.source_height,
            width: staged.width,
            height: staged.height,
            file_extension: staged.format.file_extension(),
            mime_type: staged.format.mime_type(),
            process_time_ms,
            data: staged.data,
            source: retained,
            options,
        })
    }

    /// Process independent queries in parallel. Results keep input order;
    /// each entry succeeds or fails on its own.
    pub fn process_batch(&self, queries: Vec<ProcessQuery>) -> Vec<Result<ProcessOutput>> {
        queries
            .into_par_iter()
            .map(|query| self.process(query))
            .collect()
    }

    fn execute(&self, source: ImageSource, options: &ProcessOptions) -> Result<StageResult> {
        debug!(kind = source.kind(), "transcode start");
        let loaded = source.decode()?;
        let source_width = loaded.image.width();
        let source_height = loaded.image.height();
        let intrinsic = loaded.format;

        let image = if options.max_width.is_none() && options.max_height.is_none() {
            loaded.image
        } else {
            let (target_w, target_h) = calc_bounded_dimensions(
                source_width,
                source_height,
                options.max_width.unwrap_or(0),
                options.max_height.unwrap_or(0),
            );
            if (target_w, target_h) == (source_width, source_height) {
                loaded.image
            } else {
                debug!(source_width, source_height, target_w, target_h, "resizing");
                resize_to(loaded.image, target_w, target_h)?
            }
        };
        let width = image.width();
        let height = image.height();

        let params = EncodeParams::resolve(options.format.as_deref(), options.quality)
            .unwrap_or_else(|| EncodeParams::native(intrinsic));
        let data = encoder::encode(&image, &params)?;
        drop(image);

        let data = if options.execute_post_processor {
            self.post_processor.compress(
                data,
                params.format.file_extension(),
                options.file_name.as_deref(),
            )?
        } else {
            data
        };

        Ok(StageResult {
            source_width,
            source_height,
            width,
            height,
            format: params.format,
            data,
        })
    }
}

/// Composes a `Transcoder` from its collaborators. Anything not supplied
/// falls back to the built-in registry, a fresh stats instance, and the
/// lossless PNG optimizer.
#[derive(Default)]
pub struct TranscoderBuilder {
    registry: Option<FormatRegistry>,
    stats: Option<Arc<ProcessingStats>>,
    post_processor: Option<Arc<dyn PostProcess>>,
}

impl TranscoderBuilder {
    pub fn registry(mut self, registry: FormatRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn stats(mut self, stats: Arc<ProcessingStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn post_processor(mut self, post_processor: Arc<dyn PostProcess>) -> Self {
        self.post_processor = Some(post_processor);
        self
    }

    pub fn build(self) -> Transcoder {
        Transcoder {
            registry: self
                .registry
                .unwrap_or_else(|| FormatRegistry::builtin().clone()),
            stats: self.stats.unwrap_or_default(),
            post_processor: self
                .post_processor
                .unwrap_or_else(|| Arc::new(LosslessOptimizer::default())),
        }
    }
}
