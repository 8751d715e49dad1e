//! Loading and saving RGBA8 bitmaps.
//!
//! The file format follows the path's extension (`.bmp`, `.png`).

use std::path::{Path, PathBuf};

use crate::compute::ImageBuffer;

/// Image file errors, numbered like the bitmap loader's status codes.
#[derive(Debug, thiserror::Error)]
pub enum ImageFormatError {
    #[error("Cannot open image file {}: {source}", .path.display())]
    CannotOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Bad image format in {}: {message}", .path.display())]
    BadFormat { path: PathBuf, message: String },

    #[error("Cannot write image file {}: {message}", .path.display())]
    CannotWrite { path: PathBuf, message: String },
}

impl ImageFormatError {
    pub const CANNOT_OPEN_FILE: i32 = 1;
    pub const BAD_FORMAT: i32 = 3;
    pub const CANNOT_WRITE_PIXEL_TO_FILE: i32 = 7;

    /// Process exit status for this error.
    pub fn code(&self) -> i32 {
        match self {
            ImageFormatError::CannotOpen { .. } => Self::CANNOT_OPEN_FILE,
            ImageFormatError::BadFormat { .. } => Self::BAD_FORMAT,
            ImageFormatError::CannotWrite { .. } => Self::CANNOT_WRITE_PIXEL_TO_FILE,
        }
    }
}

/// Decode an image file and convert it to RGBA8.
pub fn load_rgba8(path: impl AsRef<Path>) -> Result<ImageBuffer, ImageFormatError> {
    let path = path.as_ref();
    let decoded = image::open(path).map_err(|e| match e {
        image::ImageError::IoError(source) => ImageFormatError::CannotOpen {
            path: path.to_path_buf(),
            source,
        },
        other => ImageFormatError::BadFormat {
            path: path.to_path_buf(),
            message: other.to_string(),
        },
    })?;

    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    log::debug!("loaded {} ({}x{})", path.display(), width, height);

    ImageBuffer::from_rgba8(width as usize, height as usize, rgba.into_raw()).map_err(|e| {
        ImageFormatError::BadFormat {
            path: path.to_path_buf(),
            message: e.to_string(),
        }
    })
}

/// Encode `image` to `path`.
pub fn save_rgba8(path: impl AsRef<Path>, image: &ImageBuffer) -> Result<(), ImageFormatError> {
    let path = path.as_ref();
    let cannot_write = |message: String| ImageFormatError::CannotWrite {
        path: path.to_path_buf(),
        message,
    };

    let width = u32::try_from(image.width()).map_err(|e| cannot_write(e.to_string()))?;
    let height = u32::try_from(image.height()).map_err(|e| cannot_write(e.to_string()))?;
    let rgba = image::RgbaImage::from_raw(width, height, image.as_bytes().to_vec())
        .ok_or_else(|| cannot_write("pixel buffer does not match dimensions".to_string()))?;

    rgba.save(path).map_err(|e| cannot_write(e.to_string()))?;
    log::debug!("saved {} ({}x{})", path.display(), width, height);
    Ok(())
}
