//! Per-stage timing accumulated from device profiling events.

use std::fmt;

use serde::Serialize;

use super::Stage;

/// Start/end timestamps of one device command, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProfilingEvent {
    pub start_ns: u64,
    pub end_ns: u64,
}

impl ProfilingEvent {
    /// Elapsed nanoseconds; zero if the clock went backwards.
    #[inline]
    pub fn elapsed_ns(&self) -> u64 {
        self.end_ns.saturating_sub(self.start_ns)
    }
}

/// Convert nanoseconds to milliseconds.
#[inline]
pub fn nanos_to_ms(nanos: u64) -> f64 {
    nanos as f64 * 1e-6
}

/// Running totals for write, per-device compute and read stages.
///
/// Totals only ever grow; there is no reset within a run.
#[derive(Debug, Clone)]
pub struct Profiler {
    write_ms: f64,
    read_ms: f64,
    compute: Vec<(String, f64)>,
}

impl Profiler {
    /// Profiler with one compute slot per participating device.
    pub fn new<S: Into<String>>(device_names: impl IntoIterator<Item = S>) -> Self {
        Self {
            write_ms: 0.0,
            read_ms: 0.0,
            compute: device_names
                .into_iter()
                .map(|name| (name.into(), 0.0))
                .collect(),
        }
    }

    /// Add `elapsed_ns` to the total for `stage` on device slot `device`.
    ///
    /// Transfers are accumulated across devices; kernel time is kept per
    /// device and discarded with a warning for a slot that does not exist.
    /// Other stages are not timed.
    pub fn record(&mut self, stage: Stage, device: usize, elapsed_ns: u64) {
        let ms = nanos_to_ms(elapsed_ns);
        match stage {
            Stage::Write => self.write_ms += ms,
            Stage::Read => self.read_ms += ms,
            Stage::Kernel => match self.compute.get_mut(device) {
                Some((_, total)) => *total += ms,
                None => log::warn!(
                    "dropping {} ms of kernel time for unknown device slot {} ({} slots)",
                    ms,
                    device,
                    self.compute.len()
                ),
            },
            Stage::Open | Stage::Allocate => {}
        }
    }

    /// Record a device event.
    #[inline]
    pub fn record_event(&mut self, stage: Stage, device: usize, event: ProfilingEvent) {
        self.record(stage, device, event.elapsed_ns());
    }

    /// Current totals in milliseconds.
    pub fn summary(&self) -> TimingSummary {
        TimingSummary {
            write_ms: self.write_ms,
            compute: self
                .compute
                .iter()
                .map(|(device, ms)| DeviceTiming {
                    device: device.clone(),
                    ms: *ms,
                })
                .collect(),
            read_ms: self.read_ms,
        }
    }
}

/// Compute time of one device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceTiming {
    pub device: String,
    pub ms: f64,
}

/// Snapshot of accumulated stage totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingSummary {
    pub write_ms: f64,
    pub compute: Vec<DeviceTiming>,
    pub read_ms: f64,
}

impl TimingSummary {
    /// Sum of all stage totals.
    pub fn total_ms(&self) -> f64 {
        self.write_ms + self.read_ms + self.compute.iter().map(|c| c.ms).sum::<f64>()
    }
}

impl fmt::Display for TimingSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Time of writing image to device: {} ms.", self.write_ms)?;
        match self.compute.as_slice() {
            [single] => writeln!(f, "Execution time: {} ms.", single.ms)?,
            many => {
                for timing in many {
                    writeln!(f, "Execution {} time: {} ms.", timing.device, timing.ms)?;
                }
            }
        }
        write!(f, "Time of reading image from device: {} ms.", self.read_ms)
    }
}
