//! Run orchestration: plan once, then dispatch every tile in order.

use super::{
    DeviceSet, DispatchError, DispatchMode, DispatchPlan, ImageBuffer, Profiler, ProgramSource,
    TimingSummary, dispatch_combo, dispatch_single,
};
use crate::schema::DispatchConfig;

/// Result of a completed run.
#[derive(Debug)]
pub struct DispatchOutput {
    /// Processed image, same dimensions as the input.
    pub image: ImageBuffer,
    /// Accumulated stage totals.
    pub timings: TimingSummary,
    /// Number of tiles dispatched.
    pub tiles: usize,
}

/// Drives a configured set of devices over whole images.
pub struct Dispatcher {
    config: DispatchConfig,
    devices: DeviceSet,
}

impl Dispatcher {
    /// Open the configured devices and build the kernel on each.
    pub fn from_config(config: DispatchConfig) -> Result<Self, DispatchError> {
        config.validate()?;
        let devices = DeviceSet::open(&config)?;
        Self::new(config, devices)
    }

    /// Use already-opened devices.
    ///
    /// The kernel program is built on every device here, so a build failure
    /// is reported before any tile is touched.
    pub fn new(config: DispatchConfig, mut devices: DeviceSet) -> Result<Self, DispatchError> {
        config.validate()?;

        if config.device.is_combo() != devices.is_pair() {
            return Err(DispatchError::MissingDevice(devices.descriptors().len()));
        }

        let program = ProgramSource::from_config(&config.kernel).map_err(|source| {
            DispatchError::KernelSource {
                path: config.kernel.source.clone().unwrap_or_default(),
                source,
            }
        })?;
        devices.build(&program)?;

        log::info!(
            "built `{}` on {} device(s)",
            program.entry_point,
            devices.descriptors().len()
        );

        Ok(Self { config, devices })
    }

    #[inline]
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Newline-separated names of the participating devices.
    pub fn device_names(&self) -> String {
        self.devices.device_names()
    }

    /// Process `source` tile by tile into a new image.
    ///
    /// Tiles run sequentially. The first failing tile aborts the run and
    /// its error is returned unchanged.
    pub fn run(&self, source: &ImageBuffer) -> Result<DispatchOutput, DispatchError> {
        let descriptors = self.devices.descriptors();
        let plan = DispatchPlan::new(
            source.width(),
            source.height(),
            &descriptors,
            self.config.device,
            self.config.ratio,
            self.config.tile_limit,
        )?;

        log::info!(
            "{}x{} image: {} tile(s) of at most {}x{}, mode {:?}",
            plan.image_width,
            plan.image_height,
            plan.tiles.len(),
            plan.piece_limit.width,
            plan.piece_limit.height,
            plan.mode
        );

        let mut profiler = Profiler::new(descriptors.iter().map(|d| d.class.to_string()));
        let mut destination = ImageBuffer::zeroed(source.width(), source.height());
        let kernel = &self.config.kernel;

        for (index, tile) in plan.tiles.iter().enumerate() {
            log::debug!(
                "tile {}/{} at ({}, {}) {}x{}",
                index + 1,
                plan.tiles.len(),
                tile.x_offset,
                tile.y_offset,
                tile.width,
                tile.height
            );

            let result = match (&self.devices, plan.mode) {
                (DeviceSet::Single(device), DispatchMode::Single) => dispatch_single(
                    device.as_ref(),
                    kernel,
                    source,
                    tile,
                    &mut profiler,
                    &mut destination,
                ),
                (DeviceSet::Pair { a, b }, DispatchMode::Combo { ratio }) => dispatch_combo(
                    a.as_ref(),
                    b.as_ref(),
                    kernel,
                    ratio,
                    source,
                    tile,
                    &mut profiler,
                    &mut destination,
                ),
                _ => Err(DispatchError::MissingDevice(descriptors.len())),
            };

            if let Err(e) = result {
                log::error!("tile {} failed: {}", index + 1, e);
                return Err(e);
            }
        }

        Ok(DispatchOutput {
            image: destination,
            timings: profiler.summary(),
            tiles: plan.tiles.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::{CpuDevice, mask_pixel};
    use crate::schema::{CpuDeviceConfig, DeviceSelection, MaskColor, TileLimit};

    fn cpu_config() -> DispatchConfig {
        DispatchConfig {
            device: DeviceSelection::Cpu,
            cpu: CpuDeviceConfig {
                threads: Some(2),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_cpu_run_applies_single_selector() {
        let mut config = cpu_config();
        config.tile_limit = Some(TileLimit {
            width: 3,
            height: 2,
        });
        let dispatcher = Dispatcher::from_config(config).unwrap();

        let source = ImageBuffer::filled(7, 5, [200, 100, 50, 255]);
        let output = dispatcher.run(&source).unwrap();

        assert_eq!(output.tiles, 3 * 3);
        let expected = mask_pixel([200, 100, 50, 255], MaskColor::Bw);
        for y in 0..5 {
            for x in 0..7 {
                assert_eq!(output.image.pixel(x, y), expected);
            }
        }
        assert_eq!(output.timings.compute.len(), 1);
        assert_eq!(output.timings.compute[0].device, "CPU");
    }

    #[test]
    fn test_empty_image_runs_zero_tiles() {
        let dispatcher = Dispatcher::from_config(cpu_config()).unwrap();
        let output = dispatcher.run(&ImageBuffer::zeroed(0, 0)).unwrap();
        assert_eq!(output.tiles, 0);
        assert_eq!(output.timings.total_ms(), 0.0);
    }

    #[test]
    fn test_combo_selection_needs_pair() {
        let config = DispatchConfig {
            device: DeviceSelection::Combo,
            ..cpu_config()
        };
        let cpu = CpuDevice::new(&config.cpu).unwrap();
        let err = Dispatcher::new(config, DeviceSet::Single(Box::new(cpu)))
            .err()
            .unwrap();
        assert!(matches!(err, DispatchError::MissingDevice(1)));
    }

    #[test]
    fn test_missing_kernel_source_file() {
        let mut config = cpu_config();
        config.kernel.source = Some("/nonexistent/mask.wgsl".into());
        let err = Dispatcher::from_config(config).err().unwrap();
        assert!(matches!(err, DispatchError::KernelSource { .. }));
        assert_eq!(err.code(), crate::compute::codes::CANNOT_OPEN_FILE);
    }

    #[test]
    fn test_unknown_entry_point_fails_build() {
        let mut config = cpu_config();
        config.kernel.entry_point = "no_such_kernel".to_string();
        let err = Dispatcher::from_config(config).err().unwrap();
        assert!(matches!(err, DispatchError::Build(_)));
    }
}
