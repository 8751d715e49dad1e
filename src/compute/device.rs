//! Compute device abstraction shared by the CPU and GPU backends.

use std::borrow::Cow;
use std::fmt;
use std::path::Path;
use std::time::Instant;

use super::{BYTES_PER_PIXEL, BuildError, DeviceError, ProfilingEvent, Stage, Tile, codes};
use crate::schema::{KernelConfig, MaskColor};

/// Entry point of the built-in mask kernel.
pub const MASK_TO_IMAGE: &str = "mask_to_image";

const MASK_SHADER: &str = include_str!("gpu/shaders/mask.wgsl");

/// Kind of compute unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceClass {
    Cpu,
    Gpu,
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceClass::Cpu => f.write_str("CPU"),
            DeviceClass::Gpu => f.write_str("GPU"),
        }
    }
}

/// Identity and limits of one compute device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Human-readable device name.
    pub name: String,
    pub class: DeviceClass,
    /// Largest single allocation in bytes.
    pub max_alloc_bytes: u64,
    /// Widest tile one kernel launch can cover, in pixels.
    pub max_tile_width: usize,
    /// Tallest band one kernel launch can cover, in rows.
    pub max_tile_height: usize,
}

impl DeviceDescriptor {
    /// Descriptor with no launch-size limit beyond the allocation.
    pub fn new(name: impl Into<String>, class: DeviceClass, max_alloc_bytes: u64) -> Self {
        Self {
            name: name.into(),
            class,
            max_alloc_bytes,
            max_tile_width: usize::MAX,
            max_tile_height: usize::MAX,
        }
    }

    /// Limit the iteration space of a single launch.
    pub fn with_dispatch_limit(mut self, max_tile_width: usize, max_tile_height: usize) -> Self {
        self.max_tile_width = max_tile_width;
        self.max_tile_height = max_tile_height;
        self
    }
}

/// Kernel program handed to each device's build step.
#[derive(Debug, Clone)]
pub struct ProgramSource {
    /// WGSL source for GPU devices.
    pub source: Cow<'static, str>,
    /// Entry point launched for every tile.
    pub entry_point: String,
}

impl ProgramSource {
    /// The built-in mask kernel.
    pub fn mask_to_image() -> Self {
        Self {
            source: Cow::Borrowed(MASK_SHADER),
            entry_point: MASK_TO_IMAGE.to_string(),
        }
    }

    /// Program described by a kernel configuration: the configured WGSL
    /// file, or the built-in shader under the configured entry point.
    pub fn from_config(config: &KernelConfig) -> std::io::Result<Self> {
        match &config.source {
            Some(path) => Self::from_file(path, config.entry_point.clone()),
            None => Ok(Self {
                source: Cow::Borrowed(MASK_SHADER),
                entry_point: config.entry_point.clone(),
            }),
        }
    }

    /// Custom WGSL with the same bindings as the mask kernel.
    pub fn from_wgsl(source: impl Into<String>, entry_point: impl Into<String>) -> Self {
        Self {
            source: Cow::Owned(source.into()),
            entry_point: entry_point.into(),
        }
    }

    /// Read WGSL from a file.
    pub fn from_file(
        path: impl AsRef<Path>,
        entry_point: impl Into<String>,
    ) -> std::io::Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Ok(Self::from_wgsl(source, entry_point))
    }
}

/// Device-side input and output storage for one tile.
///
/// Both devices of a combo pair work on the same storage; bands are carved
/// out of `output` with `split_at_mut`.
#[derive(Debug)]
pub struct TileStorage {
    pub input: Vec<u8>,
    pub output: Vec<u8>,
}

/// One kernel invocation over a band of a tile.
#[derive(Debug)]
pub struct KernelLaunch<'a> {
    pub entry_point: &'a str,
    /// Whole-tile input, `width * height * 4` bytes.
    pub input: &'a [u8],
    /// Output rows `[offset_y, offset_y + rows)` only.
    pub output: &'a mut [u8],
    /// Tile width in pixels.
    pub width: usize,
    /// Tile height in pixels.
    pub height: usize,
    /// First tile row of the iteration space.
    pub offset_y: usize,
    /// Rows in the iteration space.
    pub rows: usize,
    pub selector: MaskColor,
}

/// A device that can hold tile storage, run the kernel and transfer data.
///
/// Every operation blocks until the device reports completion and returns
/// the command's profiling timestamps.
pub trait ComputeDevice: Send + Sync {
    fn descriptor(&self) -> &DeviceDescriptor;

    /// Compile `program` for this device.
    fn build(&mut self, program: &ProgramSource) -> Result<(), BuildError>;

    /// Allocate storage sized exactly to `tile`.
    fn allocate(&self, tile: &Tile) -> Result<TileStorage, DeviceError> {
        let desc = self.descriptor();
        let bytes = tile.byte_len() as u64;
        if bytes > desc.max_alloc_bytes {
            return Err(DeviceError::new(
                Stage::Allocate,
                desc.name.clone(),
                codes::MEM_OBJECT_ALLOCATION_FAILURE,
                format!(
                    "tile of {} bytes exceeds the {} byte allocation limit",
                    bytes, desc.max_alloc_bytes
                ),
            ));
        }
        Ok(TileStorage {
            input: vec![0; tile.byte_len()],
            output: vec![0; tile.byte_len()],
        })
    }

    /// Transfer `data` into device input storage.
    fn write_image(&self, storage: &mut [u8], data: &[u8]) -> Result<ProfilingEvent, DeviceError>;

    /// Run the kernel over one band and wait for it.
    fn enqueue_kernel(&self, launch: KernelLaunch<'_>) -> Result<ProfilingEvent, DeviceError>;

    /// Transfer device output storage into `dst`.
    fn read_image(&self, storage: &[u8], dst: &mut [u8]) -> Result<ProfilingEvent, DeviceError>;
}

/// Monotonic nanosecond clock anchored at device creation.
#[derive(Debug, Clone, Copy)]
pub struct DeviceClock {
    epoch: Instant,
}

impl DeviceClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Nanoseconds since the epoch.
    #[inline]
    pub fn now_ns(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    /// Run `f`, returning its result and the start/end timestamps.
    pub fn timed<R>(&self, f: impl FnOnce() -> R) -> (R, ProfilingEvent) {
        let start_ns = self.now_ns();
        let result = f();
        let end_ns = self.now_ns();
        (result, ProfilingEvent { start_ns, end_ns })
    }
}

impl Default for DeviceClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Host-memory copy used by devices that share storage with the host.
pub(crate) fn copy_checked(
    device: &DeviceDescriptor,
    stage: Stage,
    dst: &mut [u8],
    src: &[u8],
) -> Result<(), DeviceError> {
    if dst.len() != src.len() {
        return Err(DeviceError::new(
            stage,
            device.name.clone(),
            codes::INVALID_BUFFER_SIZE,
            format!("transfer of {} bytes into {} bytes", src.len(), dst.len()),
        ));
    }
    dst.copy_from_slice(src);
    Ok(())
}

/// Validate a launch's iteration space against its buffers.
pub(crate) fn check_launch(
    device: &DeviceDescriptor,
    launch: &KernelLaunch<'_>,
) -> Result<(), DeviceError> {
    let row_bytes = launch.width * BYTES_PER_PIXEL;
    let fail = |message: String| -> Result<(), DeviceError> {
        Err(DeviceError::new(
            Stage::Kernel,
            device.name.clone(),
            codes::INVALID_WORK_GROUP_SIZE,
            message,
        ))
    };

    if launch.offset_y + launch.rows > launch.height {
        return fail(format!(
            "rows [{}, {}) outside tile height {}",
            launch.offset_y,
            launch.offset_y + launch.rows,
            launch.height
        ));
    }
    if launch.input.len() != row_bytes * launch.height {
        return fail(format!(
            "input has {} bytes, tile needs {}",
            launch.input.len(),
            row_bytes * launch.height
        ));
    }
    if launch.output.len() != row_bytes * launch.rows {
        return fail(format!(
            "output band has {} bytes, expected {}",
            launch.output.len(),
            row_bytes * launch.rows
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_monotonic() {
        let clock = DeviceClock::new();
        let ((), event) = clock.timed(|| std::thread::sleep(std::time::Duration::from_millis(1)));
        assert!(event.end_ns >= event.start_ns);
        assert!(event.elapsed_ns() >= 1_000_000);
    }

    #[test]
    fn test_builtin_program_has_entry() {
        let program = ProgramSource::mask_to_image();
        assert_eq!(program.entry_point, MASK_TO_IMAGE);
        assert!(program.source.contains("fn mask_to_image"));
    }

    struct HostOnly(DeviceDescriptor);

    impl ComputeDevice for HostOnly {
        fn descriptor(&self) -> &DeviceDescriptor {
            &self.0
        }

        fn build(&mut self, _program: &ProgramSource) -> Result<(), BuildError> {
            Ok(())
        }

        fn write_image(&self, _: &mut [u8], _: &[u8]) -> Result<ProfilingEvent, DeviceError> {
            Ok(ProfilingEvent::default())
        }

        fn enqueue_kernel(&self, _: KernelLaunch<'_>) -> Result<ProfilingEvent, DeviceError> {
            Ok(ProfilingEvent::default())
        }

        fn read_image(&self, _: &[u8], _: &mut [u8]) -> Result<ProfilingEvent, DeviceError> {
            Ok(ProfilingEvent::default())
        }
    }

    #[test]
    fn test_allocate_sized_to_tile() {
        let device = HostOnly(DeviceDescriptor::new("host", DeviceClass::Cpu, 96));
        let tile = Tile {
            x_offset: 1,
            y_offset: 2,
            width: 4,
            height: 6,
        };
        let storage = device.allocate(&tile).unwrap();
        assert_eq!(storage.input.len(), 96);
        assert_eq!(storage.output.len(), 96);

        let err = device
            .allocate(&Tile {
                height: 7,
                ..tile
            })
            .unwrap_err();
        assert_eq!(err.stage, Stage::Allocate);
        assert_eq!(err.code, codes::MEM_OBJECT_ALLOCATION_FAILURE);
    }

    #[test]
    fn test_descriptor_dispatch_limit() {
        let desc = DeviceDescriptor::new("gpu", DeviceClass::Gpu, 1 << 20);
        assert_eq!(desc.max_tile_width, usize::MAX);
        let desc = desc.with_dispatch_limit(64, 32);
        assert_eq!((desc.max_tile_width, desc.max_tile_height), (64, 32));
    }

    #[test]
    fn test_check_launch_rejects_overrun() {
        let desc = DeviceDescriptor::new("test", DeviceClass::Cpu, 1 << 20);
        let input = vec![0u8; 2 * 3 * 4];
        let mut output = vec![0u8; 2 * 2 * 4];
        let launch = KernelLaunch {
            entry_point: MASK_TO_IMAGE,
            input: &input,
            output: &mut output,
            width: 2,
            height: 3,
            offset_y: 2,
            rows: 2,
            selector: MaskColor::Identity,
        };
        let err = check_launch(&desc, &launch).unwrap_err();
        assert_eq!(err.stage, Stage::Kernel);
    }
}
