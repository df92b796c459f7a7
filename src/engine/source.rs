// src/engine/source.rs
//
// Image source variants and decode dispatch.

use crate::engine::decoder::{self, LoadedImage};
use crate::error::{MillError, Result};
use image::DynamicImage;
use memmap2::Mmap;
use std::any::Any;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::PathBuf;
use std::sync::Arc;

/// The caller-supplied input to a transcode.
///
/// Exactly one variant is active and the loader dispatches on the tag alone,
/// never on content. The compiler enforces that every variant is handled; an
/// unrecognized input can only occur at the type-erased [`from_value`]
/// boundary.
///
/// [`from_value`]: ImageSource::from_value
pub enum ImageSource {
    /// Encoded bytes, shared with the caller.
    Bytes(Arc<Vec<u8>>),
    /// An owned byte stream, read to end at decode time. The stream is
    /// assumed positioned at its start.
    Reader(Box<dyn Read + Send>),
    /// An already decoded image, adopted directly with no re-decode.
    Decoded(DynamicImage),
    /// Path to an image file, memory-mapped at decode time.
    Path(PathBuf),
}

impl ImageSource {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::Bytes(Arc::new(bytes))
    }

    pub fn from_shared(bytes: Arc<Vec<u8>>) -> Self {
        Self::Bytes(bytes)
    }

    pub fn from_reader(reader: impl Read + Send + 'static) -> Self {
        Self::Reader(Box::new(reader))
    }

    pub fn from_decoded(image: DynamicImage) -> Self {
        Self::Decoded(image)
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    /// Convert a type-erased value from an embedding runtime.
    ///
    /// Recognizes `Vec<u8>`, `Arc<Vec<u8>>`, `Cursor<Vec<u8>>`, `File`,
    /// `DynamicImage`, `PathBuf`, and `String`/`&str` path references. Anything
    /// else fails with the value's fully qualified type name so the embedder
    /// can see exactly what it handed over.
    pub fn from_value<T: Any + Send>(value: T) -> Result<Self> {
        let type_name = std::any::type_name::<T>();
        let boxed: Box<dyn Any> = Box::new(value);

        let boxed = match boxed.downcast::<Vec<u8>>() {
            Ok(bytes) => return Ok(Self::Bytes(Arc::new(*bytes))),
            Err(other) => other,
        };
        let boxed = match boxed.downcast::<Arc<Vec<u8>>>() {
            Ok(bytes) => return Ok(Self::Bytes(*bytes)),
            Err(other) => other,
        };
        let boxed = match boxed.downcast::<Cursor<Vec<u8>>>() {
            Ok(cursor) => return Ok(Self::Reader(Box::new(*cursor))),
            Err(other) => other,
        };
        let boxed = match boxed.downcast::<File>() {
            Ok(file) => return Ok(Self::Reader(Box::new(*file))),
            Err(other) => other,
        };
        let boxed = match boxed.downcast::<DynamicImage>() {
            Ok(image) => return Ok(Self::Decoded(*image)),
            Err(other) => other,
        };
        let boxed = match boxed.downcast::<PathBuf>() {
            Ok(path) => return Ok(Self::Path(*path)),
            Err(other) => other,
        };
        match boxed.downcast::<String>() {
            Ok(path) => Ok(Self::Path(PathBuf::from(*path))),
            Err(_) => Err(MillError::unsupported_source(type_name)),
        }
    }

    /// Variant tag for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bytes(_) => "bytes",
            Self::Reader(_) => "reader",
            Self::Decoded(_) => "decoded",
            Self::Path(_) => "path",
        }
    }

    /// Whether the source visibly carries no data. Readers cannot be checked
    /// without consuming them and are assumed non-empty here.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Bytes(bytes) => bytes.is_empty(),
            Self::Reader(_) => false,
            Self::Decoded(image) => image.width() == 0 || image.height() == 0,
            Self::Path(path) => path.as_os_str().is_empty(),
        }
    }

    /// A second handle to the source for callers that asked to keep it.
    /// Consumable variants (reader, decoded) cannot be shared.
    pub fn try_share(&self) -> Option<ImageSource> {
        match self {
            Self::Bytes(bytes) => Some(Self::Bytes(Arc::clone(bytes))),
            Self::Path(path) => Some(Self::Path(path.clone())),
            Self::Reader(_) | Self::Decoded(_) => None,
        }
    }

    /// Dispatch to the matching decode entry point, consuming the source.
    pub fn decode(self) -> Result<LoadedImage> {
        match self {
            Self::Bytes(bytes) => decoder::decode_image(&bytes),
            Self::Reader(mut reader) => {
                let mut bytes = Vec::new();
                reader
                    .read_to_end(&mut bytes)
                    .map_err(MillError::stream_read_failed)?;
                decoder::decode_image(&bytes)
            }
            Self::Decoded(image) => {
                decoder::check_dimensions(image.width(), image.height())?;
                Ok(LoadedImage {
                    image,
                    format: None,
                })
            }
            Self::Path(path) => {
                let display = path.to_string_lossy().into_owned();
                let file =
                    File::open(&path).map_err(|e| MillError::file_read_failed(display.clone(), e))?;
                // Safety: the mapping is read-only and dropped before this
                // call returns; concurrent truncation of the underlying file
                // is outside the crate's contract, as with any mmap consumer.
                let mapped = unsafe { Mmap::map(&file) }
                    .map_err(|e| MillError::mmap_failed(display, e))?;
                decoder::decode_image(&mapped)
            }
        }
    }
}

impl std::fmt::Debug for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Reader(_) => f.write_str("Reader(..)"),
            Self::Decoded(image) => f
                .debug_tuple("Decoded")
                .field(&(image.width(), image.height()))
                .finish(),
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
        }
    }
}
