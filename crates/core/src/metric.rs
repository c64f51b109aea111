use serde::{Deserialize, Serialize};
use std::fmt;

/// The three metric streams the collector samples.
///
/// Each kind owns an independent series and its own retention floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Cpu,
    Memory,
    Fps,
}

impl MetricKind {
    pub const ALL: [MetricKind; 3] = [MetricKind::Cpu, MetricKind::Memory, MetricKind::Fps];

    /// Minimum number of samples a closed series needs to be kept.
    ///
    /// FPS points already aggregate one second of frames, so fewer of them
    /// are needed than the twice-a-second CPU and memory readings.
    pub const fn min_retain(self) -> usize {
        match self {
            MetricKind::Cpu    => 20,
            MetricKind::Memory => 20,
            MetricKind::Fps    => 10,
        }
    }

    /// Dense index, used for per-kind arrays.
    pub const fn index(self) -> usize {
        match self {
            MetricKind::Cpu    => 0,
            MetricKind::Memory => 1,
            MetricKind::Fps    => 2,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            MetricKind::Cpu    => "cpu",
            MetricKind::Memory => "memory",
            MetricKind::Fps    => "fps",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retention_floors_are_asymmetric() {
        assert_eq!(MetricKind::Cpu.min_retain(), 20);
        assert_eq!(MetricKind::Memory.min_retain(), 20);
        assert_eq!(MetricKind::Fps.min_retain(), 10);
    }

    #[test]
    fn indices_are_dense() {
        for (i, kind) in MetricKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }
}
