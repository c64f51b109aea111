use perf_core::{PerfError, Result};
use serde::{Deserialize, Serialize};

/// Root configuration structure parsed from `perfwatch.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerfConfig {
    /// `tracing` filter used when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Timer and sampler settings.
    pub sampling: SamplingConfig,
    /// Health-report recording settings.
    pub health: HealthConfig,
}

impl Default for PerfConfig {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            sampling: SamplingConfig::default(),
            health: HealthConfig::default(),
        }
    }
}

impl PerfConfig {
    /// Reject values that would stall or spin the timers.
    pub fn validate(&self) -> Result<()> {
        let s = &self.sampling;
        if s.interval_ms == 0 {
            return Err(PerfError::Config("sampling.interval_ms must be > 0".into()));
        }
        if s.fps_window_ms == 0 {
            return Err(PerfError::Config("sampling.fps_window_ms must be > 0".into()));
        }
        if s.refresh_hz == 0 {
            return Err(PerfError::Config("sampling.refresh_hz must be > 0".into()));
        }
        if s.listing_command.is_empty() {
            return Err(PerfError::Config("sampling.listing_command is empty".into()));
        }
        Ok(())
    }
}

/// Sampling cadence and strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// CPU / memory timer period in milliseconds.
    pub interval_ms: u64,
    /// Frame-rate reporting window in milliseconds.
    pub fps_window_ms: u64,
    /// Upper clamp applied to each frame-rate reading.
    pub max_frame_rate: u32,
    /// Tick rate of the built-in frame clock (hosts without a compositor).
    pub refresh_hz: u32,
    /// How CPU usage is measured.
    pub cpu_strategy: CpuStrategyKind,
    /// Process-listing command used by the snapshot CPU strategy.
    pub listing_command: Vec<String>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_ms:    500,
            fps_window_ms:  1000,
            max_frame_rate: 60,
            refresh_hz:     60,
            cpu_strategy:   CpuStrategyKind::Auto,
            listing_command: vec!["top".into(), "-b".into(), "-n".into(), "1".into()],
        }
    }
}

/// CPU measurement strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CpuStrategyKind {
    /// Kernel counters when readable, otherwise the process listing.
    #[default]
    Auto,
    /// Parse the output of an external process-listing tool.
    Snapshot,
    /// Delta of `/proc/stat` and `/proc/<pid>/stat` tick counters.
    Counters,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Feed samples into the health aggregator.
    pub recording: bool,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { recording: true }
    }
}
