//! Flat RGBA8 pixel buffer.

use super::DispatchError;

/// Bytes per RGBA8 pixel.
pub const BYTES_PER_PIXEL: usize = 4;

/// Row-major RGBA8 image with stride `width * 4`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl ImageBuffer {
    /// Wrap tightly packed RGBA8 bytes.
    pub fn from_rgba8(width: usize, height: usize, data: Vec<u8>) -> Result<Self, DispatchError> {
        let expected = width * height * BYTES_PER_PIXEL;
        if data.len() != expected {
            return Err(DispatchError::UnsupportedFormat(format!(
                "{}x{} RGBA8 needs {} bytes, got {}",
                width,
                height,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Wrap a buffer with an explicit row stride and pixel size.
    ///
    /// Only 4-byte pixels with stride `width * 4` are accepted.
    pub fn with_layout(
        width: usize,
        height: usize,
        stride: usize,
        bytes_per_pixel: usize,
        data: Vec<u8>,
    ) -> Result<Self, DispatchError> {
        if bytes_per_pixel != BYTES_PER_PIXEL {
            return Err(DispatchError::UnsupportedFormat(format!(
                "{} bytes per pixel, expected {}",
                bytes_per_pixel, BYTES_PER_PIXEL
            )));
        }
        if stride != width * BYTES_PER_PIXEL {
            return Err(DispatchError::UnsupportedFormat(format!(
                "row stride {} for width {}, expected {}",
                stride,
                width,
                width * BYTES_PER_PIXEL
            )));
        }
        Self::from_rgba8(width, height, data)
    }

    /// Zero-filled image.
    pub fn zeroed(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height * BYTES_PER_PIXEL],
        }
    }

    /// Image filled with a single RGBA color.
    pub fn filled(width: usize, height: usize, rgba: [u8; 4]) -> Self {
        let data = rgba
            .iter()
            .copied()
            .cycle()
            .take(width * height * BYTES_PER_PIXEL)
            .collect();
        Self {
            width,
            height,
            data,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Bytes per row.
    #[inline]
    pub fn stride(&self) -> usize {
        self.width * BYTES_PER_PIXEL
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// RGBA value at `(x, y)`.
    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> [u8; 4] {
        let i = y * self.stride() + x * BYTES_PER_PIXEL;
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }
}
