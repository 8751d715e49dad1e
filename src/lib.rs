//! Tile Dispatch - Tiled image processing across CPU and GPU devices.
//!
//! Images larger than a device can allocate in one piece are cut into a grid
//! of tiles. Each tile is uploaded, processed by a named kernel and merged
//! back into the output. In combo mode every tile is split into two
//! horizontal bands that a CPU and a GPU process concurrently.
//!
//! # Architecture
//!
//! - `schema`: Configuration types (device selection, split ratio, kernel)
//! - `compute`: Planning, region copies, devices, dispatch and profiling
//! - `imageio`: Bitmap loading and saving
//!
//! # Example
//!
//! ```rust,no_run
//! use tile_dispatch::{
//!     compute::Dispatcher,
//!     imageio,
//!     schema::{DeviceSelection, DispatchConfig},
//! };
//!
//! let config = DispatchConfig {
//!     device: DeviceSelection::Cpu,
//!     ..Default::default()
//! };
//! let dispatcher = Dispatcher::from_config(config)?;
//!
//! let input = imageio::load_rgba8("input.bmp")?;
//! let output = dispatcher.run(&input)?;
//! imageio::save_rgba8("output.bmp", &output.image)?;
//!
//! println!("{}", output.timings);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod compute;
pub mod imageio;
pub mod schema;

// Re-export commonly used types
pub use compute::{DispatchError, DispatchOutput, Dispatcher, ImageBuffer, TimingSummary};
pub use schema::{DeviceSelection, DispatchConfig, SplitRatio};
