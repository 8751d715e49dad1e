//! Opening the devices a run needs.

use super::gpu::GpuDevice;
use super::{BuildError, ComputeDevice, CpuDevice, DeviceDescriptor, ProgramSource, Stage};
use crate::compute::DispatchError;
use crate::schema::{DeviceSelection, DispatchConfig};

/// Devices participating in a run.
pub enum DeviceSet {
    /// One device processes whole tiles.
    Single(Box<dyn ComputeDevice>),
    /// Device A takes the top band of every tile, device B the rest.
    Pair {
        a: Box<dyn ComputeDevice>,
        b: Box<dyn ComputeDevice>,
    },
}

impl DeviceSet {
    /// Open the devices selected by `config`.
    ///
    /// Combo pairs the host CPU (device A) with the first GPU (device B).
    pub fn open(config: &DispatchConfig) -> Result<Self, DispatchError> {
        let set = match config.device {
            DeviceSelection::Cpu => DeviceSet::Single(Box::new(CpuDevice::new(&config.cpu)?)),
            DeviceSelection::Gpu => DeviceSet::Single(Box::new(open_gpu(config)?)),
            DeviceSelection::Combo => DeviceSet::Pair {
                a: Box::new(CpuDevice::new(&config.cpu)?),
                b: Box::new(open_gpu(config)?),
            },
        };
        Ok(set)
    }

    /// Descriptors in device order (A before B).
    pub fn descriptors(&self) -> Vec<&DeviceDescriptor> {
        match self {
            DeviceSet::Single(device) => vec![device.descriptor()],
            DeviceSet::Pair { a, b } => vec![a.descriptor(), b.descriptor()],
        }
    }

    /// Newline-separated device names.
    pub fn device_names(&self) -> String {
        self.descriptors()
            .iter()
            .map(|d| format!("{}\n", d.name))
            .collect()
    }

    /// Build `program` on every device, stopping at the first failure.
    pub fn build(&mut self, program: &ProgramSource) -> Result<(), BuildError> {
        match self {
            DeviceSet::Single(device) => device.build(program),
            DeviceSet::Pair { a, b } => {
                a.build(program)?;
                b.build(program)
            }
        }
    }

    #[inline]
    pub fn is_pair(&self) -> bool {
        matches!(self, DeviceSet::Pair { .. })
    }
}

fn open_gpu(config: &DispatchConfig) -> Result<GpuDevice, DispatchError> {
    pollster::block_on(GpuDevice::new(&config.gpu))
        .map_err(|e| DispatchError::Device(e.into_device_error(Stage::Open, "GPU")))
}
