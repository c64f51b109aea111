use crate::metric::MetricKind;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Hard cap on the number of samples a single series may hold.
///
/// Appends past this point are dropped; the series never rotates.
pub const MAX_SAMPLES: usize = 40;

/// One timestamped reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Wall-clock time in epoch milliseconds.
    pub timestamp_millis: i64,
    pub value: f32,
}

impl Sample {
    pub fn new(timestamp_millis: i64, value: f32) -> Self {
        Self { timestamp_millis, value }
    }

    /// A sample stamped with the current wall-clock time.
    pub fn now(value: f32) -> Self {
        Self::new(Utc::now().timestamp_millis(), value)
    }
}

/// The currently visible navigation context reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    /// Opaque identity; equal ids mean "the same page".
    pub id: String,
    /// Human-readable page name, e.g. a screen type.
    pub page: String,
}

impl Context {
    pub fn new(id: impl Into<String>, page: impl Into<String>) -> Self {
        Self {
            id:   id.into(),
            page: page.into(),
        }
    }
}

/// An ordered, bounded run of samples for one metric within one context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub kind: MetricKind,
    pub context_id: String,
    pub page: String,
    pub samples: Vec<Sample>,
}

impl Series {
    pub fn new(kind: MetricKind, context: &Context, first: Sample) -> Self {
        let mut samples = Vec::with_capacity(MAX_SAMPLES);
        samples.push(first);
        Self {
            kind,
            context_id: context.id.clone(),
            page: context.page.clone(),
            samples,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() >= MAX_SAMPLES
    }

    /// Append a sample unless the series is already full.
    ///
    /// Returns `false` when the sample was dropped.
    pub fn push(&mut self, sample: Sample) -> bool {
        if self.is_full() {
            return false;
        }
        self.samples.push(sample);
        true
    }

    pub fn summary(&self) -> SeriesSummary {
        SeriesSummary {
            kind: self.kind,
            context_id: self.context_id.clone(),
            len: self.samples.len(),
        }
    }
}

/// The minimal view of an open series the aggregator needs to run its
/// state machine. The sample data itself lives in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesSummary {
    pub kind: MetricKind,
    pub context_id: String,
    pub len: usize,
}

impl SeriesSummary {
    pub fn is_full(&self) -> bool {
        self.len >= MAX_SAMPLES
    }

    /// Whether this series, if closed now, meets its kind's retention floor.
    pub fn meets_retention(&self) -> bool {
        self.len >= self.kind.min_retain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_stops_at_cap() {
        let ctx = Context::new("a", "Main");
        let mut series = Series::new(MetricKind::Fps, &ctx, Sample::new(0, 1.0));
        for i in 1..MAX_SAMPLES {
            assert!(series.push(Sample::new(i as i64, 1.0)));
        }
        assert!(series.is_full());
        assert!(!series.push(Sample::new(99, 2.0)));
        assert_eq!(series.len(), MAX_SAMPLES);
        assert_eq!(series.samples.last().map(|s| s.timestamp_millis), Some(39));
    }

    #[test]
    fn retention_uses_kind_floor() {
        let summary = SeriesSummary {
            kind: MetricKind::Fps,
            context_id: "a".into(),
            len: 10,
        };
        assert!(summary.meets_retention());

        let summary = SeriesSummary { kind: MetricKind::Cpu, ..summary };
        assert!(!summary.meets_retention());
    }
}
