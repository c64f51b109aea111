use crate::store::SeriesStore;
use parking_lot::Mutex;
use perf_core::{Context, MetricKind, Sample, SeriesSummary};
use tracing::{debug, trace, warn};

/// What [`Aggregator::record`] did with a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// First series for this metric was created.
    Started,
    /// Sample appended to the open series.
    Appended,
    /// Open series is full; sample dropped.
    Dropped,
    /// Context changed: the old series was closed (and possibly discarded)
    /// and a new one opened with this sample.
    Rotated { discarded: bool },
    /// The store rejected the write; nothing changed.
    Failed,
}

/// Context-aware rolling buffer in front of a [`SeriesStore`].
///
/// All producers funnel through one lock, so context-switch evaluation for
/// a metric can never interleave with an append.
pub struct Aggregator<S> {
    inner: Mutex<Inner<S>>,
}

struct Inner<S> {
    store:    S,
    open:     [Option<SeriesSummary>; 3],
    hydrated: [bool; 3],
}

impl<S: SeriesStore> Aggregator<S> {
    pub fn new(store: S) -> Self {
        Self {
            inner: Mutex::new(Inner {
                store,
                open:     Default::default(),
                hydrated: [false; 3],
            }),
        }
    }

    /// Record `value` for `kind`, observed while `context` was visible.
    pub fn record(&self, kind: MetricKind, value: f32, context: &Context) -> Outcome {
        self.inner.lock().record(kind, Sample::now(value), context)
    }

    /// Like [`record`](Self::record) with an explicit timestamp.
    pub fn record_sample(&self, kind: MetricKind, sample: Sample, context: &Context) -> Outcome {
        self.inner.lock().record(kind, sample, context)
    }

    /// Current open series for `kind`, as the aggregator sees it.
    pub fn open_series(&self, kind: MetricKind) -> Option<SeriesSummary> {
        let mut inner = self.inner.lock();
        inner.hydrate(kind);
        inner.open[kind.index()].clone()
    }

    /// Run `f` against the store while holding the aggregation lock.
    pub fn with_store<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.inner.lock().store)
    }
}

impl<S: SeriesStore> Inner<S> {
    /// Pick up a series left open in the store by an earlier session.
    fn hydrate(&mut self, kind: MetricKind) {
        let slot = kind.index();
        if !self.hydrated[slot] {
            self.open[slot] = self.store.open_series(kind);
            self.hydrated[slot] = true;
        }
    }

    fn record(&mut self, kind: MetricKind, sample: Sample, context: &Context) -> Outcome {
        self.hydrate(kind);
        let slot = kind.index();

        let Some(open) = self.open[slot].as_mut() else {
            return if self.open_new(kind, context, sample) {
                Outcome::Started
            } else {
                Outcome::Failed
            };
        };

        if open.context_id == context.id {
            if open.is_full() {
                trace!(%kind, context = %context.id, "series full; sample dropped");
                return Outcome::Dropped;
            }
            return match self.store.append_sample(kind, &context.id, sample) {
                Ok(()) => {
                    open.len += 1;
                    Outcome::Appended
                }
                Err(e) => {
                    warn!(%kind, "append failed: {e}");
                    Outcome::Failed
                }
            };
        }

        let closing = open.clone();
        let discarded = !closing.meets_retention();
        if discarded {
            match self.store.discard_series(kind) {
                Ok(()) => debug!(
                    %kind,
                    context = %closing.context_id,
                    len = closing.len,
                    floor = kind.min_retain(),
                    "closed series discarded"
                ),
                Err(e) => {
                    // Keep the closing series open so the next sample
                    // retries the discard.
                    warn!(%kind, "discard failed: {e}");
                    return Outcome::Failed;
                }
            }
        } else {
            debug!(%kind, context = %closing.context_id, len = closing.len, "closed series kept");
        }

        if self.open_new(kind, context, sample) {
            Outcome::Rotated { discarded }
        } else {
            Outcome::Failed
        }
    }

    fn open_new(&mut self, kind: MetricKind, context: &Context, first: Sample) -> bool {
        let slot = kind.index();
        match self.store.create_series(kind, context, first) {
            Ok(()) => {
                debug!(%kind, context = %context.id, page = %context.page, "series opened");
                self.open[slot] = Some(SeriesSummary {
                    kind,
                    context_id: context.id.clone(),
                    len: 1,
                });
                true
            }
            Err(e) => {
                warn!(%kind, "create failed: {e}");
                // Re-sync with whatever the store now considers open.
                self.open[slot] = self.store.open_series(kind);
                false
            }
        }
    }
}
