use perf_core::{Context, MetricKind, PerfError, Result, Sample, Series, SeriesSummary};
use serde::Serialize;
use tracing::debug;

/// Persistent home of committed series.
///
/// The most recently created series of a kind is its open series. Writes are
/// keyed by `(kind, context_id)`, and the aggregator only ever touches the
/// open series.
pub trait SeriesStore: Send {
    /// Summary of the most recent series of `kind`, if any.
    fn open_series(&self, kind: MetricKind) -> Option<SeriesSummary>;

    /// Commit a new series holding exactly `first`; it becomes the open one.
    fn create_series(&mut self, kind: MetricKind, context: &Context, first: Sample) -> Result<()>;

    /// Append to the open series of `kind`, which must belong to `context_id`.
    fn append_sample(&mut self, kind: MetricKind, context_id: &str, sample: Sample) -> Result<()>;

    /// Drop the open series of `kind` entirely.
    fn discard_series(&mut self, kind: MetricKind) -> Result<()>;
}

/// Everything recorded so far, grouped by metric.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HealthReport {
    pub cpu:    Vec<Series>,
    pub memory: Vec<Series>,
    pub fps:    Vec<Series>,
}

/// In-memory [`SeriesStore`], the hand-off point to a report uploader.
#[derive(Debug, Default)]
pub struct HealthStore {
    series: [Vec<Series>; 3],
}

impl HealthStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn series(&self, kind: MetricKind) -> &[Series] {
        &self.series[kind.index()]
    }

    pub fn snapshot(&self) -> HealthReport {
        HealthReport {
            cpu:    self.series(MetricKind::Cpu).to_vec(),
            memory: self.series(MetricKind::Memory).to_vec(),
            fps:    self.series(MetricKind::Fps).to_vec(),
        }
    }
}

impl SeriesStore for HealthStore {
    fn open_series(&self, kind: MetricKind) -> Option<SeriesSummary> {
        self.series[kind.index()].last().map(Series::summary)
    }

    fn create_series(&mut self, kind: MetricKind, context: &Context, first: Sample) -> Result<()> {
        self.series[kind.index()].push(Series::new(kind, context, first));
        Ok(())
    }

    fn append_sample(&mut self, kind: MetricKind, context_id: &str, sample: Sample) -> Result<()> {
        let open = self.series[kind.index()]
            .last_mut()
            .filter(|s| s.context_id == context_id)
            .ok_or_else(|| {
                PerfError::Store(format!("no open {kind} series for context {context_id:?}"))
            })?;

        if !open.push(sample) {
            return Err(PerfError::Store(format!("{kind} series for {context_id:?} is full")));
        }
        Ok(())
    }

    fn discard_series(&mut self, kind: MetricKind) -> Result<()> {
        if self.series[kind.index()].pop().is_none() {
            debug!(%kind, "discard with no open series");
        }
        Ok(())
    }
}
