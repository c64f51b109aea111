use parking_lot::Mutex;
use perf_core::{MetricKind, MonitorStatus};
use perf_health::{Aggregator, SeriesStore};
use perf_system::{sample_memory, CpuSampler, FrameCounter, Host};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::trace;

/// State shared between the scheduler and its sampling tasks.
pub(crate) struct Shared<S> {
    pub host:           Arc<dyn Host>,
    pub aggregator:     Arc<Aggregator<S>>,
    pub status:         MonitorStatus,
    pub recording:      AtomicBool,
    /// `None` once the scheduler has shut down and released its handles.
    pub cpu:            Mutex<Option<CpuSampler>>,
    pub frames:         Arc<FrameCounter>,
    pub max_frame_rate: u32,
}

impl<S: SeriesStore> Shared<S> {
    /// One scheduled sampling step.
    ///
    /// CPU and memory ticks do nothing while the host is in the background.
    /// The frame-rate window always closes (so the count never spans two
    /// windows) but is only recorded while in the foreground.
    pub fn tick(&self, kind: MetricKind) {
        let foreground = self.host.is_foreground();

        let value = match kind {
            MetricKind::Fps => {
                let fps = self.frames.take(self.max_frame_rate) as f32;
                self.status.set_last_value(kind, fps);
                if !foreground {
                    trace!(fps, "backgrounded; frame-rate window not recorded");
                    return;
                }
                fps
            }
            MetricKind::Cpu | MetricKind::Memory => {
                if !foreground {
                    trace!(%kind, "backgrounded; tick skipped");
                    return;
                }
                let sampled = match kind {
                    MetricKind::Cpu => self
                        .cpu
                        .lock()
                        .as_mut()
                        .and_then(|cpu| cpu.sample(self.host.as_ref())),
                    _ => Some(sample_memory(self.host.as_ref())),
                };
                let Some(value) = sampled else { return };
                self.status.set_last_value(kind, value);
                value
            }
        };

        self.record(kind, value);
    }

    fn record(&self, kind: MetricKind, value: f32) {
        if !self.recording.load(Ordering::Acquire) {
            return;
        }
        let Some(context) = self.host.current_context() else {
            trace!(%kind, "no visible context; sample not recorded");
            return;
        };
        let outcome = self.aggregator.record(kind, value, &context);
        trace!(%kind, value, ?outcome, "sample recorded");
    }
}

/// Tick `kind` every `period`, starting one period from now.
pub(crate) async fn run_timer<S: SeriesStore>(shared: Arc<Shared<S>>, kind: MetricKind, period: Duration) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        shared.tick(kind);
    }
}
