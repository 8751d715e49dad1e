//! Per-tile dispatch onto one device or a cooperating pair.

use super::{
    BYTES_PER_PIXEL, ComputeDevice, DispatchError, ImageBuffer, KernelLaunch, ProfilingEvent,
    Profiler, SplitBand, Stage, Tile, extract_region, merge_region, split_bands,
};
use crate::schema::{KernelConfig, MaskColor, SplitRatio};

/// Profiler slot of device A (or the sole device).
pub const DEVICE_A: usize = 0;
/// Profiler slot of device B.
pub const DEVICE_B: usize = 1;

/// Extract a tile, allocate storage on `device` and transfer the input.
fn upload_tile(
    device: &dyn ComputeDevice,
    source: &ImageBuffer,
    tile: &Tile,
    profiler: &mut Profiler,
) -> Result<super::TileStorage, DispatchError> {
    let piece = extract_region(source.as_bytes(), source.width(), tile)?;
    let mut storage = device.allocate(tile)?;
    let event = device.write_image(&mut storage.input, &piece)?;
    profiler.record_event(Stage::Write, DEVICE_A, event);
    Ok(storage)
}

/// Read the tile's output back and merge it into `destination`.
fn download_tile(
    device: &dyn ComputeDevice,
    storage: &super::TileStorage,
    tile: &Tile,
    profiler: &mut Profiler,
    destination: &mut ImageBuffer,
) -> Result<(), DispatchError> {
    let mut result = vec![0u8; tile.byte_len()];
    let event = device.read_image(&storage.output, &mut result)?;
    profiler.record_event(Stage::Read, DEVICE_A, event);

    let width = destination.width();
    merge_region(destination.as_bytes_mut(), width, tile, &result)
}

/// Run one tile whole on a single device.
pub fn dispatch_single(
    device: &dyn ComputeDevice,
    kernel: &KernelConfig,
    source: &ImageBuffer,
    tile: &Tile,
    profiler: &mut Profiler,
    destination: &mut ImageBuffer,
) -> Result<(), DispatchError> {
    let mut storage = upload_tile(device, source, tile, profiler)?;

    let event = device.enqueue_kernel(KernelLaunch {
        entry_point: &kernel.entry_point,
        input: &storage.input,
        output: &mut storage.output,
        width: tile.width,
        height: tile.height,
        offset_y: 0,
        rows: tile.height,
        selector: kernel.single,
    })?;
    profiler.record_event(Stage::Kernel, DEVICE_A, event);

    download_tile(device, &storage, tile, profiler, destination)
}

/// Launch one band, skipping empty bands.
fn launch_band(
    device: &dyn ComputeDevice,
    entry_point: &str,
    input: &[u8],
    output: &mut [u8],
    tile: &Tile,
    band: SplitBand,
    selector: MaskColor,
) -> Result<Option<ProfilingEvent>, super::DeviceError> {
    if band.rows == 0 {
        return Ok(None);
    }
    device
        .enqueue_kernel(KernelLaunch {
            entry_point,
            input,
            output,
            width: tile.width,
            height: tile.height,
            offset_y: band.y_offset,
            rows: band.rows,
            selector,
        })
        .map(Some)
}

/// Run one tile split into two bands on devices A and B concurrently.
///
/// Both bands are launched before either is awaited. If both fail, device
/// A's error is reported.
pub fn dispatch_combo(
    device_a: &dyn ComputeDevice,
    device_b: &dyn ComputeDevice,
    kernel: &KernelConfig,
    ratio: SplitRatio,
    source: &ImageBuffer,
    tile: &Tile,
    profiler: &mut Profiler,
    destination: &mut ImageBuffer,
) -> Result<(), DispatchError> {
    let mut storage = upload_tile(device_a, source, tile, profiler)?;

    let (band_a, band_b) = split_bands(tile.height, ratio);
    let row_bytes = tile.width * BYTES_PER_PIXEL;
    let input = storage.input.as_slice();
    let (out_a, out_b) = storage.output.split_at_mut(band_a.rows * row_bytes);
    let entry_point = kernel.entry_point.as_str();

    log::trace!(
        "tile ({}, {}): band A rows [0, {}), band B rows [{}, {})",
        tile.x_offset,
        tile.y_offset,
        band_a.rows,
        band_b.y_offset,
        tile.height
    );

    let (result_a, result_b) = rayon::join(
        || launch_band(device_a, entry_point, input, out_a, tile, band_a, kernel.band_a),
        || launch_band(device_b, entry_point, input, out_b, tile, band_b, kernel.band_b),
    );
    let event_a = result_a?;
    let event_b = result_b?;

    if let Some(event) = event_a {
        profiler.record_event(Stage::Kernel, DEVICE_A, event);
    }
    if let Some(event) = event_b {
        profiler.record_event(Stage::Kernel, DEVICE_B, event);
    }

    download_tile(device_a, &storage, tile, profiler, destination)
}
