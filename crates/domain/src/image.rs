use std::path::Path;

use crate::DomainError;

/// The closed set of media types the upload boundary accepts. Anything else
/// is rejected before a `SelectedImage` can exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Webp,
    Gif,
}

impl ImageFormat {
    /// Exact match on the declared MIME type; no sniffing, no aliases.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "image/jpeg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/webp" => Some(Self::Webp),
            "image/gif" => Some(Self::Gif),
            _ => None,
        }
    }

    /// Derives the declared MIME type from a file extension, for files that
    /// arrive through a path picker rather than a drop event.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension().and_then(|ext| ext.to_str())?;
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::Webp),
            "gif" => Some(Self::Gif),
            _ => None,
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
            Self::Gif => "image/gif",
        }
    }
}

/// The query image chosen by the user, owned by the session until cleared or
/// replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedImage {
    pub name: String,
    pub format: ImageFormat,
    pub bytes: Vec<u8>,
}

impl SelectedImage {
    pub fn new(name: impl Into<String>, format: ImageFormat, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            format,
            bytes,
        }
    }

    /// Boundary constructor: validates the declared MIME type before the
    /// payload enters the model.
    pub fn from_declared_mime(
        name: impl Into<String>,
        mime: &str,
        bytes: Vec<u8>,
    ) -> Result<Self, DomainError> {
        let format = ImageFormat::from_mime(mime)
            .ok_or_else(|| DomainError::UnsupportedMediaType(mime.to_string()))?;
        Ok(Self::new(name, format, bytes))
    }

    pub fn byte_size(&self) -> usize {
        self.bytes.len()
    }
}
