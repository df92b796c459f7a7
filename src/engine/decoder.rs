// src/engine/decoder.rs
//
// Decode routing: JPEG via mozjpeg, PNG via zune-png, WebP via libwebp,
// everything else through the image crate.

use crate::engine::common::run_with_panic_policy;
use crate::engine::{MAX_DIMENSION, MAX_PIXELS};
use crate::error::{MillError, Result};
use image::{DynamicImage, GrayAlphaImage, GrayImage, ImageFormat, RgbImage, RgbaImage};
use mozjpeg::Decompress;
use tracing::trace;
use webp::{BitstreamFeatures, Decoder as WebPDecoder};
use zune_core::bytestream::ZCursor;
use zune_core::colorspace::ColorSpace;
use zune_core::options::DecoderOptions;
use zune_png::PngDecoder;

/// A decoded working image plus the container format it came from.
#[derive(Debug)]
pub struct LoadedImage {
    pub image: DynamicImage,
    /// None when the bytes matched no known container (or there were no
    /// bytes, as with an adopted pre-decoded image).
    pub format: Option<ImageFormat>,
}

/// Detect the container format from magic bytes.
pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
    image::guess_format(bytes).ok()
}

/// Decode encoded bytes, routing each container to its preferred codec.
pub fn decode_image(bytes: &[u8]) -> Result<LoadedImage> {
    let detected = detect_format(bytes);
    trace!(format = ?detected, len = bytes.len(), "decoding source bytes");
    let image = match detected {
        Some(ImageFormat::Jpeg) => decode_jpeg(bytes)?,
        Some(ImageFormat::Png) => decode_png(bytes)?,
        Some(ImageFormat::WebP) => decode_webp(bytes)?,
        _ => decode_fallback(bytes)?,
    };
    Ok(LoadedImage {
        image,
        format: detected,
    })
}

/// Decode JPEG through mozjpeg (libjpeg-turbo), much faster than the pure
/// Rust decoder.
pub fn decode_jpeg(bytes: &[u8]) -> Result<DynamicImage> {
    run_with_panic_policy("decode:jpeg", || {
        // Truncated files make libjpeg-turbo emit garbage rows; require the
        // EOI marker up front.
        if !bytes.windows(2).any(|pair| pair == [0xFF, 0xD9]) {
            return Err(MillError::decode_failed("jpeg: missing EOI marker"));
        }

        let decompress = Decompress::new_mem(bytes)
            .map_err(|e| MillError::decode_failed(format!("jpeg: init failed: {e:?}")))?;
        let mut decompress = decompress
            .rgb()
            .map_err(|e| MillError::decode_failed(format!("jpeg: rgb conversion failed: {e:?}")))?;

        let width = decompress.width() as u32;
        let height = decompress.height() as u32;
        check_dimensions(width, height)?;

        let rows: Vec<[u8; 3]> = decompress
            .read_scanlines()
            .map_err(|e| MillError::decode_failed(format!("jpeg: scanline read failed: {e:?}")))?;
        let pixels: Vec<u8> = rows.into_iter().flatten().collect();

        RgbImage::from_raw(width, height, pixels)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| MillError::decode_failed("jpeg: scanline buffer size mismatch"))
    })
}

/// Decode PNG through zune-png; 16-bit input is stripped to 8-bit.
pub fn decode_png(bytes: &[u8]) -> Result<DynamicImage> {
    run_with_panic_policy("decode:png", || {
        let options = DecoderOptions::default().png_set_strip_to_8bit(true);
        let mut decoder = PngDecoder::new_with_options(ZCursor::new(bytes), options);
        let pixels = decoder
            .decode()
            .map_err(|e| MillError::decode_failed(format!("png: decode failed: {e}")))?;

        let info = decoder
            .info()
            .ok_or_else(|| MillError::decode_failed("png: missing header info"))?;
        let width = info.width as u32;
        let height = info.height as u32;
        check_dimensions(width, height)?;

        let buf = match pixels {
            zune_core::result::DecodingResult::U8(v) => v,
            _ => return Err(MillError::decode_failed("png: non-U8 pixel buffer")),
        };

        let colorspace = decoder
            .colorspace()
            .ok_or_else(|| MillError::decode_failed("png: missing colorspace"))?;

        let image = match colorspace {
            ColorSpace::RGB => RgbImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(|| MillError::decode_failed("png: bad RGB buffer"))?,
            ColorSpace::RGBA | ColorSpace::YCbCr | ColorSpace::BGRA | ColorSpace::ARGB => {
                RgbaImage::from_raw(width, height, buf)
                    .map(DynamicImage::ImageRgba8)
                    .ok_or_else(|| MillError::decode_failed("png: bad RGBA buffer"))?
            }
            ColorSpace::Luma => GrayImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(|| MillError::decode_failed("png: bad Luma buffer"))?,
            ColorSpace::LumaA => GrayAlphaImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageLumaA8)
                .ok_or_else(|| MillError::decode_failed("png: bad LumaA buffer"))?,
            other => {
                return Err(MillError::decode_failed(format!(
                    "png: unsupported colorspace {other:?}"
                )))
            }
        };

        Ok(image)
    })
}

/// Decode WebP through libwebp. Animated WebP is outside the simple decoder's
/// reach and falls back to the image crate.
pub fn decode_webp(bytes: &[u8]) -> Result<DynamicImage> {
    run_with_panic_policy("decode:webp", || {
        let features = BitstreamFeatures::new(bytes)
            .ok_or_else(|| MillError::decode_failed("webp: unreadable bitstream header"))?;

        if features.has_animation() {
            return image::load_from_memory(bytes)
                .map_err(|e| MillError::decode_failed(format!("webp (animated): {e}")));
        }

        check_dimensions(features.width(), features.height())?;

        let decoded = WebPDecoder::new(bytes)
            .decode()
            .ok_or_else(|| MillError::decode_failed("webp: decode failed"))?;
        check_dimensions(decoded.width(), decoded.height())?;

        Ok(decoded.to_image())
    })
}

/// Decode any remaining container (GIF, BMP, unknown) with the image crate.
pub fn decode_fallback(bytes: &[u8]) -> Result<DynamicImage> {
    run_with_panic_policy("decode:image", || {
        let image = image::load_from_memory(bytes)
            .map_err(|e| MillError::decode_failed(format!("decode failed: {e}")))?;
        check_dimensions(image.width(), image.height())?;
        Ok(image)
    })
}

/// Reject dimensions that exceed the engine's safety limits.
pub fn check_dimensions(width: u32, height: u32) -> Result<()> {
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(MillError::dimension_exceeds_limit(
            width.max(height),
            MAX_DIMENSION,
        ));
    }
    let pixels = width as u64 * height as u64;
    if pixels > MAX_PIXELS {
        return Err(MillError::pixel_count_exceeds_limit(pixels, MAX_PIXELS));
    }
    Ok(())
}
