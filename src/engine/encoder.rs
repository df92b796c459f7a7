// src/engine/encoder.rs
//
// Encoder dispatch: JPEG (mozjpeg), PNG (plain or indexed-palette), GIF, WebP.

use crate::engine::common::run_with_panic_policy;
use crate::error::{MillError, Result};
use crate::ops::{EncodeParams, OutputFormat};
use color_quant::NeuQuant;
use image::codecs::gif::GifEncoder;
use image::{DynamicImage, Frame, ImageFormat};
use mozjpeg::{ColorSpace, Compress};
use std::borrow::Cow;
use std::io::Cursor;
use tracing::trace;

/// Encode the working image with the resolved parameters.
pub fn encode(img: &DynamicImage, params: &EncodeParams) -> Result<Vec<u8>> {
    trace!(format = ?params.format, quality = params.quality, "encoding");
    match params.format {
        OutputFormat::Jpeg => encode_jpeg(img, params.quality),
        OutputFormat::Png => {
            if params.indexed_palette {
                encode_png_indexed(img, params.quality)
            } else {
                encode_png(img)
            }
        }
        OutputFormat::Gif => encode_gif(img, params.quality),
        OutputFormat::WebP => encode_webp(img, params.quality),
    }
}

/// Map a 0-100 quality to the 1-30 "effort" scale NeuQuant and the GIF
/// encoder share (1 = slowest, highest fidelity).
fn effort_from_quality(quality: u8) -> i32 {
    ((100 - quality.min(100) as i32) / 3 + 1).clamp(1, 30)
}

/// Encode to JPEG using mozjpeg: progressive, optimized coding, 4:2:0 chroma
/// below quality 90.
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    run_with_panic_policy("encode:jpeg", || {
        let rgb: Cow<'_, image::RgbImage> = match img {
            DynamicImage::ImageRgb8(rgb) => Cow::Borrowed(rgb),
            _ => Cow::Owned(img.to_rgb8()),
        };
        let (width, height) = rgb.dimensions();
        let pixels: &[u8] = rgb.as_raw();

        let expected_len = (width as usize) * (height as usize) * 3;
        if width == 0 || height == 0 || pixels.len() != expected_len {
            return Err(MillError::corrupted_image());
        }

        let quality = quality.min(100);
        let mut comp = Compress::new(ColorSpace::JCS_RGB);
        comp.set_size(width as usize, height as usize);
        comp.set_color_space(ColorSpace::JCS_YCbCr);
        comp.set_quality(quality as f32);
        comp.set_progressive_mode();
        comp.set_optimize_coding(true);
        if quality < 90 {
            comp.set_chroma_sampling_pixel_sizes((2, 2), (2, 2));
        }

        let estimated = (expected_len / 10).max(4096);
        let mut output = Vec::with_capacity(estimated);
        let mut writer = comp.start_compress(&mut output).map_err(|e| {
            MillError::encode_failed("jpeg", format!("mozjpeg start failed: {e:?}"))
        })?;

        let stride = width as usize * 3;
        for row in pixels.chunks(stride) {
            writer.write_scanlines(row).map_err(|e| {
                MillError::encode_failed("jpeg", format!("mozjpeg scanline write failed: {e:?}"))
            })?;
        }

        writer
            .finish()
            .map_err(|e| MillError::encode_failed("jpeg", format!("mozjpeg finish failed: {e:?}")))?;

        Ok(output)
    })
}

/// Encode to PNG in the image's own pixel layout. Size optimization belongs
/// to the post-processing stage, not here.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>> {
    run_with_panic_policy("encode:png", || {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .map_err(|e| MillError::encode_failed("png", format!("png encode failed: {e}")))?;
        Ok(buf)
    })
}

/// Encode to a palette PNG: NeuQuant quantization to 256 colors, written as
/// an indexed image with a tRNS chunk when any palette entry is translucent.
pub fn encode_png_indexed(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    run_with_panic_policy("encode:png-indexed", || {
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        if width == 0 || height == 0 {
            return Err(MillError::corrupted_image());
        }

        let quantizer = NeuQuant::new(effort_from_quality(quality), 256, rgba.as_raw());
        let palette = quantizer.color_map_rgba();

        let mut indices = Vec::with_capacity((width as usize) * (height as usize));
        for pixel in rgba.pixels() {
            indices.push(quantizer.index_of(&pixel.0) as u8);
        }

        let mut plte = Vec::with_capacity(palette.len() / 4 * 3);
        let mut trns = Vec::with_capacity(palette.len() / 4);
        for entry in palette.chunks_exact(4) {
            plte.extend_from_slice(&entry[..3]);
            trns.push(entry[3]);
        }

        let mut out = Vec::new();
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(png::ColorType::Indexed);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_palette(plte);
        if trns.iter().any(|&alpha| alpha != 255) {
            encoder.set_trns(trns);
        }
        let mut writer = encoder
            .write_header()
            .map_err(|e| MillError::encode_failed("png", format!("palette header: {e}")))?;
        writer
            .write_image_data(&indices)
            .map_err(|e| MillError::encode_failed("png", format!("palette data: {e}")))?;
        writer
            .finish()
            .map_err(|e| MillError::encode_failed("png", format!("palette finish: {e}")))?;

        Ok(out)
    })
}

/// Encode a single-frame GIF; quality steers the quantizer's speed/fidelity
/// trade-off.
pub fn encode_gif(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    run_with_panic_policy("encode:gif", || {
        let rgba = img.to_rgba8();
        let mut buf = Vec::new();
        {
            let mut encoder = GifEncoder::new_with_speed(&mut buf, effort_from_quality(quality));
            encoder
                .encode_frame(Frame::new(rgba))
                .map_err(|e| MillError::encode_failed("gif", format!("gif encode failed: {e}")))?;
        }
        Ok(buf)
    })
}

/// Encode to lossy WebP at the given quality.
pub fn encode_webp(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    run_with_panic_policy("encode:webp", || {
        let quality = quality.min(100) as f32;
        let encoded = match img {
            DynamicImage::ImageRgb8(rgb) => {
                let (w, h) = rgb.dimensions();
                webp::Encoder::from_rgb(rgb.as_raw(), w, h).encode(quality)
            }
            DynamicImage::ImageRgba8(rgba) => {
                let (w, h) = rgba.dimensions();
                webp::Encoder::from_rgba(rgba.as_raw(), w, h).encode(quality)
            }
            other => {
                let rgba = other.to_rgba8();
                let (w, h) = rgba.dimensions();
                webp::Encoder::from_rgba(rgba.as_raw(), w, h).encode(quality)
            }
        };
        Ok(encoded.to_vec())
    })
}
