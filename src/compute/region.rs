//! Copying tile rectangles out of and back into a full image buffer.

use super::{BYTES_PER_PIXEL, DispatchError, Tile};

/// Check that `buffer` is a whole number of `image_width`-pixel rows and
/// that `tile` lies inside it. Returns the image height.
fn check_bounds(buffer: &[u8], image_width: usize, tile: &Tile) -> Result<usize, DispatchError> {
    let stride = image_width * BYTES_PER_PIXEL;
    if stride == 0 {
        if buffer.is_empty() && tile.area() == 0 {
            return Ok(0);
        }
        return Err(DispatchError::UnsupportedFormat(format!(
            "zero-width image with {} bytes",
            buffer.len()
        )));
    }
    if buffer.len() % stride != 0 {
        return Err(DispatchError::UnsupportedFormat(format!(
            "{} bytes is not a multiple of the {}-byte RGBA8 row stride",
            buffer.len(),
            stride
        )));
    }

    let image_height = buffer.len() / stride;
    if tile.x_offset + tile.width > image_width || tile.y_offset + tile.height > image_height {
        return Err(DispatchError::TileOutOfBounds {
            x: tile.x_offset,
            y: tile.y_offset,
            width: tile.width,
            height: tile.height,
            image_width,
            image_height,
        });
    }
    Ok(image_height)
}

/// Copy `tile` out of `source` into a contiguous `width * height * 4` buffer.
pub fn extract_region(
    source: &[u8],
    image_width: usize,
    tile: &Tile,
) -> Result<Vec<u8>, DispatchError> {
    check_bounds(source, image_width, tile)?;

    let stride = image_width * BYTES_PER_PIXEL;
    let row_bytes = tile.width * BYTES_PER_PIXEL;
    let mut region = vec![0u8; tile.byte_len()];
    if row_bytes == 0 {
        return Ok(region);
    }

    for (row, dst) in region.chunks_exact_mut(row_bytes).enumerate() {
        let start = (tile.y_offset + row) * stride + tile.x_offset * BYTES_PER_PIXEL;
        dst.copy_from_slice(&source[start..start + row_bytes]);
    }

    Ok(region)
}

/// Copy a tile-local result back into `destination` at the tile's offset.
pub fn merge_region(
    destination: &mut [u8],
    image_width: usize,
    tile: &Tile,
    tile_result: &[u8],
) -> Result<(), DispatchError> {
    check_bounds(destination, image_width, tile)?;
    if tile_result.len() != tile.byte_len() {
        return Err(DispatchError::UnsupportedFormat(format!(
            "tile result has {} bytes, expected {}",
            tile_result.len(),
            tile.byte_len()
        )));
    }

    let stride = image_width * BYTES_PER_PIXEL;
    let row_bytes = tile.width * BYTES_PER_PIXEL;
    if row_bytes == 0 {
        return Ok(());
    }

    for (row, src) in tile_result.chunks_exact(row_bytes).enumerate() {
        let start = (tile.y_offset + row) * stride + tile.x_offset * BYTES_PER_PIXEL;
        destination[start..start + row_bytes].copy_from_slice(src);
    }

    Ok(())
}
