use crate::metric::MetricKind;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Shared, lock-free view of the collector's live state.
///
/// UI toggles read the per-metric `active` flags; readouts read the last
/// sampled value. Both are written by the scheduler and its sampling tasks.
#[derive(Debug)]
pub struct MonitorStatus {
    active: [AtomicBool; 3],
    /// `f32` bit patterns.
    last:   [AtomicU32; 3],
}

impl MonitorStatus {
    /// All metrics inactive; FPS starts at `initial_fps`, the others at 0.
    pub fn new(initial_fps: f32) -> Self {
        let status = Self {
            active: Default::default(),
            last:   Default::default(),
        };
        status.set_last_value(MetricKind::Fps, initial_fps);
        status
    }

    pub fn is_active(&self, kind: MetricKind) -> bool {
        self.active[kind.index()].load(Ordering::Acquire)
    }

    pub fn set_active(&self, kind: MetricKind, active: bool) {
        self.active[kind.index()].store(active, Ordering::Release);
    }

    pub fn last_value(&self, kind: MetricKind) -> f32 {
        f32::from_bits(self.last[kind.index()].load(Ordering::Acquire))
    }

    pub fn set_last_value(&self, kind: MetricKind, value: f32) {
        self.last[kind.index()].store(value.to_bits(), Ordering::Release);
    }
}

impl Default for MonitorStatus {
    fn default() -> Self {
        Self::new(0.0)
    }
}
