//! GPU compute device.
//!
//! Runs the mask kernel through a WebGPU (wgpu) compute pipeline.

mod device;

pub use device::GpuDevice;

use super::{DeviceError, Stage, codes};

/// Error type for GPU device setup.
#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("No suitable GPU adapter found")]
    NoAdapter,

    #[error("Failed to request GPU device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    #[error("Buffer mapping failed: {0}")]
    BufferMap(#[from] wgpu::BufferAsyncError),

    #[error("Device poll failed: {0}")]
    Poll(#[from] wgpu::PollError),
}

impl GpuError {
    /// Attribute this error to a stage on a named device.
    pub fn into_device_error(self, stage: Stage, device: impl Into<String>) -> DeviceError {
        let code = match &self {
            GpuError::NoAdapter | GpuError::DeviceRequest(_) => codes::DEVICE_NOT_FOUND,
            GpuError::BufferMap(_) => codes::MAP_FAILURE,
            GpuError::Poll(_) => codes::OUT_OF_RESOURCES,
        };
        DeviceError::new(stage, device, code, self.to_string())
    }
}
