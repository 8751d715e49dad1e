//! Error taxonomy for planning, region copies and device dispatch.

use std::fmt;
use std::path::PathBuf;

use crate::schema::ConfigError;

/// Status codes reported by device backends, numbered like OpenCL's.
pub mod codes {
    /// Kernel source file could not be read.
    pub const CANNOT_OPEN_FILE: i32 = 1;
    pub const DEVICE_NOT_FOUND: i32 = -1;
    pub const MEM_OBJECT_ALLOCATION_FAILURE: i32 = -4;
    pub const OUT_OF_RESOURCES: i32 = -5;
    pub const BUILD_PROGRAM_FAILURE: i32 = -11;
    pub const MAP_FAILURE: i32 = -12;
    pub const INVALID_VALUE: i32 = -30;
    pub const INVALID_BUFFER_SIZE: i32 = -61;
    pub const INVALID_KERNEL_NAME: i32 = -46;
    pub const INVALID_WORK_GROUP_SIZE: i32 = -54;
}

/// Pipeline stage an operation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    /// Opening the adapter/device or thread pool.
    Open,
    /// Allocating tile storage.
    Allocate,
    /// Transferring input to the device.
    Write,
    /// Running the kernel.
    Kernel,
    /// Transferring output back to the host.
    Read,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Open => "open",
            Stage::Allocate => "allocate",
            Stage::Write => "write",
            Stage::Kernel => "kernel",
            Stage::Read => "read",
        };
        f.write_str(name)
    }
}

/// Failure of a device operation, tagged with the stage and device.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{stage} failed on {device} ({code}): {message}")]
pub struct DeviceError {
    pub stage: Stage,
    pub device: String,
    pub code: i32,
    pub message: String,
}

impl DeviceError {
    pub fn new(
        stage: Stage,
        device: impl Into<String>,
        code: i32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            stage,
            device: device.into(),
            code,
            message: message.into(),
        }
    }
}

/// Program compilation failure with the compiler diagnostic.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("failed to build `{entry_point}` for {device}:\n{log}")]
pub struct BuildError {
    pub device: String,
    pub entry_point: String,
    pub log: String,
}

/// Errors surfaced by a dispatch run.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Piece limit along {axis} must be positive, got {limit}")]
    InvalidLimit { axis: Axis, limit: usize },

    #[error("Unsupported buffer layout: {0}")]
    UnsupportedFormat(String),

    #[error(
        "Tile at ({x}, {y}) sized {width}x{height} exceeds {image_width}x{image_height} image"
    )]
    TileOutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
        image_width: usize,
        image_height: usize,
    },

    #[error("Combo dispatch needs two devices, got {0}")]
    MissingDevice(usize),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Cannot open kernel source {}: {source}", .path.display())]
    KernelSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DispatchError {
    /// Process exit status for this error.
    pub fn code(&self) -> i32 {
        match self {
            DispatchError::Device(e) => e.code,
            DispatchError::Build(_) => codes::BUILD_PROGRAM_FAILURE,
            DispatchError::MissingDevice(_) => codes::DEVICE_NOT_FOUND,
            DispatchError::KernelSource { .. } => codes::CANNOT_OPEN_FILE,
            DispatchError::InvalidLimit { .. }
            | DispatchError::UnsupportedFormat(_)
            | DispatchError::TileOutOfBounds { .. }
            | DispatchError::Config(_) => codes::INVALID_VALUE,
        }
    }
}

/// Image axis, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::X => f.write_str("x"),
            Axis::Y => f.write_str("y"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_error_display() {
        let err = DeviceError::new(Stage::Kernel, "cpu", codes::OUT_OF_RESOURCES, "boom");
        assert_eq!(err.to_string(), "kernel failed on cpu (-5): boom");
    }

    #[test]
    fn test_stage_names() {
        let names: Vec<String> = [
            Stage::Open,
            Stage::Allocate,
            Stage::Write,
            Stage::Kernel,
            Stage::Read,
        ]
        .iter()
        .map(Stage::to_string)
        .collect();
        assert_eq!(names, ["open", "allocate", "write", "kernel", "read"]);
    }

    #[test]
    fn test_setup_errors_describe_themselves() {
        let err = DispatchError::Config(ConfigError::InvalidThreadCount);
        assert_eq!(
            err.to_string(),
            "Invalid configuration: CPU thread count must be non-zero"
        );
        assert_eq!(err.code(), codes::INVALID_VALUE);

        let err = DispatchError::Build(BuildError {
            device: "cpu".to_string(),
            entry_point: "sharpen".to_string(),
            log: "no such kernel".to_string(),
        });
        assert!(err.to_string().starts_with("failed to build `sharpen` for cpu"));
        assert_eq!(err.code(), codes::BUILD_PROGRAM_FAILURE);
    }

    #[test]
    fn test_codes_propagate() {
        let err: DispatchError =
            DeviceError::new(Stage::Write, "gpu", codes::MAP_FAILURE, "map").into();
        assert_eq!(err.code(), codes::MAP_FAILURE);

        let err = DispatchError::InvalidLimit {
            axis: Axis::X,
            limit: 0,
        };
        assert_eq!(err.code(), codes::INVALID_VALUE);
    }
}
