//! Host CPU compute device backed by a dedicated rayon thread pool.

use rayon::prelude::*;

use super::{
    BYTES_PER_PIXEL, BuildError, ComputeDevice, DeviceClass, DeviceClock, DeviceDescriptor,
    DeviceError, KernelLaunch, MASK_TO_IMAGE, ProfilingEvent, ProgramSource, Stage, check_launch,
    codes, copy_checked, mask_pixels,
};
use crate::schema::{CpuDeviceConfig, MaskColor};

/// Host kernel signature: one tile row in, one row out.
type HostKernel = fn(&[u8], &mut [u8], MaskColor);

/// Entry points the CPU device can run.
fn lookup_host_kernel(entry_point: &str) -> Option<HostKernel> {
    match entry_point {
        MASK_TO_IMAGE => Some(mask_pixels as HostKernel),
        _ => None,
    }
}

/// CPU-class compute device.
pub struct CpuDevice {
    descriptor: DeviceDescriptor,
    pool: rayon::ThreadPool,
    clock: DeviceClock,
    kernel: Option<(String, HostKernel)>,
}

impl CpuDevice {
    /// Create the device and its worker pool.
    pub fn new(config: &CpuDeviceConfig) -> Result<Self, DeviceError> {
        let mut builder =
            rayon::ThreadPoolBuilder::new().thread_name(|i| format!("tile-cpu-{}", i));
        if let Some(threads) = config.threads {
            builder = builder.num_threads(threads);
        }
        let pool = builder.build().map_err(|e| {
            DeviceError::new(Stage::Open, "CPU", codes::OUT_OF_RESOURCES, e.to_string())
        })?;

        let name = format!("Host CPU ({} threads)", pool.current_num_threads());
        log::debug!("opened {}", name);

        Ok(Self {
            descriptor: DeviceDescriptor::new(name, DeviceClass::Cpu, config.max_alloc_bytes),
            pool,
            clock: DeviceClock::new(),
            kernel: None,
        })
    }

    fn error(&self, stage: Stage, code: i32, message: impl Into<String>) -> DeviceError {
        DeviceError::new(stage, self.descriptor.name.clone(), code, message)
    }
}

impl ComputeDevice for CpuDevice {
    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    fn build(&mut self, program: &ProgramSource) -> Result<(), BuildError> {
        let kernel = lookup_host_kernel(&program.entry_point).ok_or_else(|| BuildError {
            device: self.descriptor.name.clone(),
            entry_point: program.entry_point.clone(),
            log: format!(
                "error: no host kernel named `{}` (available: {})",
                program.entry_point, MASK_TO_IMAGE
            ),
        })?;
        self.kernel = Some((program.entry_point.clone(), kernel));
        Ok(())
    }

    fn write_image(&self, storage: &mut [u8], data: &[u8]) -> Result<ProfilingEvent, DeviceError> {
        let (result, event) = self
            .clock
            .timed(|| copy_checked(&self.descriptor, Stage::Write, storage, data));
        result.map(|()| event)
    }

    fn enqueue_kernel(&self, launch: KernelLaunch<'_>) -> Result<ProfilingEvent, DeviceError> {
        let kernel = match &self.kernel {
            Some((name, kernel)) if name == launch.entry_point => *kernel,
            Some(_) | None => {
                return Err(self.error(
                    Stage::Kernel,
                    codes::INVALID_KERNEL_NAME,
                    format!("kernel `{}` was not built", launch.entry_point),
                ));
            }
        };
        check_launch(&self.descriptor, &launch)?;

        let row_bytes = launch.width * BYTES_PER_PIXEL;
        if row_bytes == 0 || launch.rows == 0 {
            let now = self.clock.now_ns();
            return Ok(ProfilingEvent {
                start_ns: now,
                end_ns: now,
            });
        }

        let start = launch.offset_y * row_bytes;
        let input = &launch.input[start..start + launch.rows * row_bytes];
        let output = launch.output;
        let selector = launch.selector;

        let ((), event) = self.clock.timed(|| {
            self.pool.install(|| {
                output
                    .par_chunks_mut(row_bytes)
                    .zip(input.par_chunks(row_bytes))
                    .for_each(|(dst, src)| kernel(src, dst, selector));
            })
        });
        Ok(event)
    }

    fn read_image(&self, storage: &[u8], dst: &mut [u8]) -> Result<ProfilingEvent, DeviceError> {
        let (result, event) = self
            .clock
            .timed(|| copy_checked(&self.descriptor, Stage::Read, dst, storage));
        result.map(|()| event)
    }
}
