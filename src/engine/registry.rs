// src/engine/registry.rs
//
// Format capability registry: which file extensions the pipeline handles.

use once_cell::sync::Lazy;

/// One supported format and the extensions it claims (lowercase, no dot).
#[derive(Clone, Debug)]
pub struct FormatCapability {
    pub name: &'static str,
    pub extensions: &'static [&'static str],
}

/// Read-only set of supported formats.
///
/// Safe to share across invocations; how entries are populated is the
/// composer's business - the built-in registry mirrors the codecs this crate
/// links.
#[derive(Clone, Debug)]
pub struct FormatRegistry {
    formats: Vec<FormatCapability>,
}

static BUILTIN: Lazy<FormatRegistry> = Lazy::new(|| {
    FormatRegistry::new(vec![
        FormatCapability {
            name: "jpeg",
            extensions: &["jpg", "jpeg"],
        },
        FormatCapability {
            name: "png",
            extensions: &["png"],
        },
        FormatCapability {
            name: "gif",
            extensions: &["gif"],
        },
        FormatCapability {
            name: "webp",
            extensions: &["webp"],
        },
    ])
});

impl FormatRegistry {
    pub fn new(formats: Vec<FormatCapability>) -> Self {
        Self { formats }
    }

    /// Registry for the codecs compiled into this crate.
    pub fn builtin() -> &'static FormatRegistry {
        &BUILTIN
    }

    pub fn formats(&self) -> &[FormatCapability] {
        &self.formats
    }

    /// Whether `ext` (lowercase, no dot) is claimed by any registered format.
    pub fn supports_extension(&self, ext: &str) -> bool {
        self.formats
            .iter()
            .any(|format| format.extensions.contains(&ext))
    }

    /// Whether the file name carries a supported extension.
    ///
    /// The extension is taken after the last dot and matched
    /// case-insensitively; a name without an extension is unsupported.
    pub fn is_supported_image(&self, file_name: &str) -> bool {
        match extension_of(file_name) {
            Some(ext) => self.supports_extension(&ext.to_ascii_lowercase()),
            None => false,
        }
    }
}

/// Extension after the last dot, or None when the name has none.
pub fn extension_of(file_name: &str) -> Option<&str> {
    std::path::Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
}
