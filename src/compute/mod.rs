//! Compute module - Tile planning, device backends and dispatch.

mod cpu;
mod device;
mod devices;
mod dispatch;
mod error;
mod image;
mod mask;
mod orchestrator;
mod plan;
mod profiler;
mod region;

pub mod gpu;

pub use cpu::*;
pub use device::*;
pub use devices::*;
pub use dispatch::*;
pub use error::*;
pub use image::*;
pub use mask::*;
pub use orchestrator::*;
pub use plan::*;
pub use profiler::*;
pub use region::*;
