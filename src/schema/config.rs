//! Configuration types for tiled dispatch runs.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default CPU allocation limit (256 MiB), a typical OpenCL CPU runtime value.
fn default_cpu_max_alloc() -> u64 {
    256 * 1024 * 1024
}

fn default_entry_point() -> String {
    "mask_to_image".to_string()
}

/// Which compute devices take part in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceSelection {
    /// Host CPU only.
    Cpu,
    /// First GPU adapter only.
    Gpu,
    /// CPU and GPU cooperating on every tile.
    #[default]
    Combo,
}

impl DeviceSelection {
    /// Whether tiles are split into two bands.
    #[inline]
    pub fn is_combo(self) -> bool {
        matches!(self, DeviceSelection::Combo)
    }
}

/// Share of each tile's rows handed to the second device in combo mode.
///
/// Values near 0 give device A (CPU) more rows, values near 1 favor
/// device B (GPU). Anything outside `[0.1, 0.9]` resolves to `0.5`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct SplitRatio(f64);

impl SplitRatio {
    pub const MIN: f64 = 0.1;
    pub const MAX: f64 = 0.9;
    pub const FALLBACK: f64 = 0.5;

    /// Accept `ratio` if it lies in `[0.1, 0.9]`, otherwise substitute `0.5`.
    pub fn new(ratio: f64) -> Self {
        if (Self::MIN..=Self::MAX).contains(&ratio) {
            Self(ratio)
        } else {
            Self(Self::FALLBACK)
        }
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }

    /// Split `height` rows into `(rows_a, rows_b)`.
    ///
    /// `rows_a = round(height * (1 - ratio))`; device B takes whatever is
    /// left, so the two always sum to `height`.
    pub fn split_rows(self, height: usize) -> (usize, usize) {
        let rows_a = ((height as f64) * (1.0 - self.0)).round() as usize;
        let rows_a = rows_a.min(height);
        (rows_a, height - rows_a)
    }
}

impl Default for SplitRatio {
    fn default() -> Self {
        Self(Self::FALLBACK)
    }
}

impl From<f64> for SplitRatio {
    fn from(ratio: f64) -> Self {
        Self::new(ratio)
    }
}

impl From<SplitRatio> for f64 {
    fn from(ratio: SplitRatio) -> Self {
        ratio.0
    }
}

/// Pixel operation applied by the mask kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskColor {
    /// Copy pixels unchanged.
    Identity,
    /// Integer luma written to all three color channels.
    #[default]
    Bw,
    /// Keep only the red channel.
    Red,
    /// Keep only the green channel.
    Green,
    /// Keep only the blue channel.
    Blue,
}

impl MaskColor {
    /// Scalar selector passed to device kernels.
    #[inline]
    pub fn selector(self) -> u32 {
        match self {
            MaskColor::Identity => 0,
            MaskColor::Bw => 1,
            MaskColor::Red => 2,
            MaskColor::Green => 3,
            MaskColor::Blue => 4,
        }
    }
}

/// Kernel entry point and per-role selectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Named entry point looked up in the built program.
    pub entry_point: String,
    /// WGSL file replacing the built-in mask shader on GPU devices.
    pub source: Option<PathBuf>,
    /// Selector used when a single device processes whole tiles.
    pub single: MaskColor,
    /// Selector for device A's band in combo mode.
    pub band_a: MaskColor,
    /// Selector for device B's band in combo mode.
    pub band_b: MaskColor,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            entry_point: default_entry_point(),
            source: None,
            single: MaskColor::Bw,
            band_a: MaskColor::Blue,
            band_b: MaskColor::Red,
        }
    }
}

/// Upper bound on tile dimensions, applied after the allocation-derived limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileLimit {
    pub width: usize,
    pub height: usize,
}

/// Host CPU device settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuDeviceConfig {
    /// Worker threads; `None` uses rayon's default (one per core).
    pub threads: Option<usize>,
    /// Largest single allocation the device accepts, in bytes.
    pub max_alloc_bytes: u64,
}

impl Default for CpuDeviceConfig {
    fn default() -> Self {
        Self {
            threads: None,
            max_alloc_bytes: default_cpu_max_alloc(),
        }
    }
}

/// Adapter power preference, mirrored so the config stays serde-friendly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PowerPreference {
    #[default]
    HighPerformance,
    LowPower,
}

/// GPU device settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuDeviceConfig {
    pub power_preference: PowerPreference,
    /// Request a software adapter instead of real hardware.
    pub force_fallback_adapter: bool,
    /// Override the adapter-reported allocation limit, in bytes.
    pub max_alloc_bytes: Option<u64>,
}

/// Top-level dispatch configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Participating devices.
    pub device: DeviceSelection,
    /// Combo-mode row split.
    pub ratio: SplitRatio,
    /// Kernel entry point and selectors.
    pub kernel: KernelConfig,
    /// Optional cap on tile size.
    pub tile_limit: Option<TileLimit>,
    pub cpu: CpuDeviceConfig,
    pub gpu: GpuDeviceConfig,
}

impl DispatchConfig {
    /// Set the combo split ratio, falling back to `0.5` when out of range.
    pub fn set_ratio(&mut self, ratio: f64) {
        let resolved = SplitRatio::new(ratio);
        if resolved.get() != ratio {
            log::warn!(
                "ratio {} outside [{}, {}], using {}",
                ratio,
                SplitRatio::MIN,
                SplitRatio::MAX,
                resolved.get()
            );
        }
        self.ratio = resolved;
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.kernel.entry_point.is_empty() {
            return Err(ConfigError::EmptyEntryPoint);
        }
        if let Some(limit) = self.tile_limit {
            if limit.width == 0 || limit.height == 0 {
                return Err(ConfigError::InvalidTileLimit);
            }
        }
        if self.cpu.threads == Some(0) {
            return Err(ConfigError::InvalidThreadCount);
        }
        if self.cpu.max_alloc_bytes == 0 || self.gpu.max_alloc_bytes == Some(0) {
            return Err(ConfigError::InvalidAllocLimit);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Kernel entry point must not be empty")]
    EmptyEntryPoint,
    #[error("Tile limit width and height must be non-zero")]
    InvalidTileLimit,
    #[error("CPU thread count must be non-zero")]
    InvalidThreadCount,
    #[error("Device allocation limits must be non-zero")]
    InvalidAllocLimit,
}
