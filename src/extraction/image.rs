//! Receipt images: recognising the format and staging the upload on disk.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use tempfile::{Builder, NamedTempFile};

use crate::Error;

/// The image formats accepted for receipts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageMediaType {
    /// A JPEG image.
    Jpeg,
    /// A PNG image.
    Png,
}

const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];
const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

impl ImageMediaType {
    /// Recognise the format from the leading bytes of the file.
    ///
    /// The client's declared content type is not trusted.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(JPEG_MAGIC) {
            Some(Self::Jpeg)
        } else if bytes.starts_with(PNG_MAGIC) {
            Some(Self::Png)
        } else {
            None
        }
    }

    /// The MIME type, e.g. "image/png".
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => ".jpg",
            Self::Png => ".png",
        }
    }
}

/// An uploaded image written to a temporary file.
///
/// The file is deleted when this value is dropped, so it cannot outlive the
/// request regardless of how extraction ends.
#[derive(Debug)]
pub(crate) struct StagedImage {
    file: NamedTempFile,
    media_type: ImageMediaType,
}

impl StagedImage {
    /// Write `bytes` to a new temporary file in `dir`, or in the system temp
    /// directory when `dir` is `None`.
    ///
    /// # Errors
    /// Returns [Error::ImageStaging] if the file cannot be created or written.
    pub(crate) fn stage(
        bytes: &[u8],
        media_type: ImageMediaType,
        dir: Option<&Path>,
    ) -> Result<Self, Error> {
        let mut builder = Builder::new();
        builder.prefix("receipt-").suffix(media_type.extension());

        let file = match dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        };
        let mut file = file.map_err(|error| {
            tracing::error!("Could not create temporary file for receipt: {error}");
            Error::ImageStaging(error.to_string())
        })?;

        file.write_all(bytes)
            .and_then(|_| file.flush())
            .map_err(|error| {
                tracing::error!("Could not write receipt to {:?}: {error}", file.path());
                Error::ImageStaging(error.to_string())
            })?;

        tracing::debug!(
            "Staged {} byte receipt at {:?}",
            bytes.len(),
            file.path()
        );

        Ok(Self { file, media_type })
    }

    /// Where the image is stored.
    pub(crate) fn path(&self) -> PathBuf {
        self.file.path().to_path_buf()
    }

    /// Read the staged image back as a `data:` URI for the model.
    ///
    /// # Errors
    /// Returns [Error::ImageStaging] if the file cannot be read.
    pub(crate) fn data_uri(&self) -> Result<String, Error> {
        let bytes = fs::read(self.file.path()).map_err(|error| {
            tracing::error!("Could not read staged receipt {:?}: {error}", self.file.path());
            Error::ImageStaging(error.to_string())
        })?;

        Ok(format!(
            "data:{};base64,{}",
            self.media_type.mime_type(),
            STANDARD.encode(bytes)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::{ImageMediaType, StagedImage};

    const TINY_PNG: &[u8] = &[
        0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D,
    ];

    #[test]
    fn sniffs_jpeg_and_png() {
        assert_eq!(
            ImageMediaType::sniff(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00]),
            Some(ImageMediaType::Jpeg)
        );
        assert_eq!(ImageMediaType::sniff(TINY_PNG), Some(ImageMediaType::Png));
    }

    #[test]
    fn rejects_other_formats() {
        assert_eq!(ImageMediaType::sniff(b"GIF89a"), None);
        assert_eq!(ImageMediaType::sniff(b"%PDF-1.7"), None);
        assert_eq!(ImageMediaType::sniff(&[]), None);
    }

    #[test]
    fn data_uri_contains_base64_image() {
        let dir = tempfile::tempdir().unwrap();
        let staged = StagedImage::stage(b"\xFF\xD8\xFFabc", ImageMediaType::Jpeg, Some(dir.path()))
            .unwrap();

        let data_uri = staged.data_uri().unwrap();

        assert_eq!(data_uri, "data:image/jpeg;base64,/9j/YWJj");
    }

    #[test]
    fn staged_file_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let staged = StagedImage::stage(TINY_PNG, ImageMediaType::Png, Some(dir.path())).unwrap();
        let path = staged.path();
        assert!(path.exists());
        assert!(path.starts_with(dir.path()));

        drop(staged);

        assert!(!path.exists());
    }

    #[test]
    fn staging_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");

        let result = StagedImage::stage(TINY_PNG, ImageMediaType::Png, Some(&missing));

        assert!(matches!(result, Err(crate::Error::ImageStaging(_))));
    }
}
