pub mod error;
pub mod metric;
pub mod series;
pub mod state;

pub use error::{PerfError, Result};
pub use metric::MetricKind;
pub use series::{Context, Sample, Series, SeriesSummary, MAX_SAMPLES};
pub use state::MonitorStatus;
