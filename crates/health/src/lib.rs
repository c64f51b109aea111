//! Rolling-buffer aggregation of metric samples into context-keyed series.

pub mod aggregator;
pub mod store;

pub use aggregator::{Aggregator, Outcome};
pub use store::{HealthReport, HealthStore, SeriesStore};
