//! Lifecycle controller for the metric streams.
//!
//! Owns the worker runtime and one background task per active metric:
//! - CPU and memory: fixed-interval timers on the worker
//! - FPS: a frame-callback loop on the host's frame clock plus a
//!   reporting-window timer
//!
//! Every task funnels its samples into one shared [`Aggregator`].

mod sampler;

use parking_lot::Mutex;
use perf_config::PerfConfig;
use perf_core::{MetricKind, MonitorStatus, PerfError, Result};
use perf_health::{Aggregator, SeriesStore};
use perf_system::{CpuSampler, FrameClock, FrameLoop, Host};
use sampler::{run_timer, Shared};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tracing::{debug, info};

// ── Worker ────────────────────────────────────────────────────────────────────

/// Where sampling tasks run.
enum Worker {
    /// A runtime created for and released by this scheduler.
    Owned(Runtime),
    /// An existing runtime owned by the caller.
    Borrowed(Handle),
}

impl Worker {
    fn handle(&self) -> Handle {
        match self {
            Worker::Owned(rt) => rt.handle().clone(),
            Worker::Borrowed(handle) => handle.clone(),
        }
    }
}

// ── Scheduler ─────────────────────────────────────────────────────────────────

/// Starts, stops, and tears down the CPU, memory, and FPS streams.
///
/// `start` and `stop` are idempotent. `stop` only prevents future ticks; a
/// tick already running completes. After [`shutdown`](Self::shutdown) the
/// scheduler cannot be restarted; build a new one instead.
pub struct Scheduler<S: SeriesStore + 'static> {
    shared:       Arc<Shared<S>>,
    frame_loop:   FrameLoop,
    tasks:        Mutex<[Option<JoinHandle<()>>; 3]>,
    worker:       Mutex<Option<Worker>>,
    interval:     Duration,
    fps_window:   Duration,
    /// `f32` bits; 0 until memory monitoring first starts.
    max_memory:   AtomicU32,
}

impl<S: SeriesStore + 'static> Scheduler<S> {
    /// Build a scheduler with its own dedicated worker runtime.
    pub fn new(
        config: &PerfConfig,
        host: Arc<dyn Host>,
        clock: Arc<dyn FrameClock>,
        aggregator: Arc<Aggregator<S>>,
    ) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("perf-sampler")
            .enable_time()
            .build()
            .map_err(|e| PerfError::Scheduler(format!("cannot start worker runtime: {e}")))?;

        Ok(Self::build(Worker::Owned(runtime), config, host, clock, aggregator))
    }

    /// Build a scheduler that spawns onto an existing runtime.
    pub fn with_handle(
        handle: Handle,
        config: &PerfConfig,
        host: Arc<dyn Host>,
        clock: Arc<dyn FrameClock>,
        aggregator: Arc<Aggregator<S>>,
    ) -> Self {
        Self::build(Worker::Borrowed(handle), config, host, clock, aggregator)
    }

    fn build(
        worker: Worker,
        config: &PerfConfig,
        host: Arc<dyn Host>,
        clock: Arc<dyn FrameClock>,
        aggregator: Arc<Aggregator<S>>,
    ) -> Self {
        let sampling = &config.sampling;
        let cpu = CpuSampler::select(sampling.cpu_strategy, host.pid());
        let frame_loop = FrameLoop::new(clock);

        let shared = Arc::new(Shared {
            host,
            aggregator,
            status: MonitorStatus::new(sampling.max_frame_rate as f32),
            recording: AtomicBool::new(config.health.recording),
            cpu: Mutex::new(Some(cpu)),
            frames: Arc::clone(frame_loop.counter()),
            max_frame_rate: sampling.max_frame_rate,
        });

        Self {
            shared,
            frame_loop,
            tasks: Mutex::new(Default::default()),
            worker: Mutex::new(Some(worker)),
            interval: Duration::from_millis(sampling.interval_ms),
            fps_window: Duration::from_millis(sampling.fps_window_ms),
            max_memory: AtomicU32::new(0),
        }
    }

    /// Begin sampling `kind`. A no-op if it is already running.
    pub fn start(&self, kind: MetricKind) -> Result<()> {
        let worker = self.worker.lock();
        let Some(worker) = worker.as_ref() else {
            return Err(PerfError::ShutDown);
        };

        let mut tasks = self.tasks.lock();
        let slot = &mut tasks[kind.index()];
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            debug!(%kind, "already running");
            return Ok(());
        }

        self.shared.status.set_active(kind, true);
        let period = match kind {
            MetricKind::Cpu => self.interval,
            MetricKind::Memory => {
                self.probe_memory_limit();
                self.interval
            }
            MetricKind::Fps => {
                self.frame_loop.arm();
                self.fps_window
            }
        };

        *slot = Some(worker.handle().spawn(run_timer(Arc::clone(&self.shared), kind, period)));
        info!(%kind, period_ms = period.as_millis() as u64, "monitoring started");
        Ok(())
    }

    /// Stop sampling `kind`. Collected series are left untouched.
    pub fn stop(&self, kind: MetricKind) {
        self.shared.status.set_active(kind, false);
        if kind == MetricKind::Fps {
            self.frame_loop.disarm();
        }
        if let Some(task) = self.tasks.lock()[kind.index()].take() {
            task.abort();
            info!(%kind, "monitoring stopped");
        }
    }

    /// Stop every stream, close the kernel counters, and release the worker.
    pub fn shutdown(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        for kind in MetricKind::ALL {
            self.stop(kind);
        }
        self.shared.cpu.lock().take();

        if let Worker::Owned(runtime) = worker {
            runtime.shutdown_background();
        }
        info!("scheduler shut down");
    }

    /// Most recent reading for `kind`.
    pub fn last_value(&self, kind: MetricKind) -> f32 {
        self.shared.status.last_value(kind)
    }

    /// Live per-metric flags and readings.
    pub fn status(&self) -> &MonitorStatus {
        &self.shared.status
    }

    /// Turn feeding samples into the aggregator on or off. Readings keep
    /// updating either way.
    pub fn set_recording(&self, recording: bool) {
        self.shared.recording.store(recording, Ordering::Release);
    }

    /// Per-process memory budget in megabytes; 0 if unknown.
    pub fn max_memory(&self) -> f32 {
        f32::from_bits(self.max_memory.load(Ordering::Acquire))
    }

    pub fn aggregator(&self) -> &Arc<Aggregator<S>> {
        &self.shared.aggregator
    }

    fn probe_memory_limit(&self) {
        if self.max_memory() == 0.0 {
            if let Some(limit) = self.shared.host.memory_limit_mb() {
                self.max_memory.store(limit.to_bits(), Ordering::Release);
            }
        }
    }
}

impl<S: SeriesStore + 'static> Drop for Scheduler<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perf_config::CpuStrategyKind;
    use perf_core::{Context, MAX_SAMPLES};
    use perf_health::HealthStore;
    use perf_system::FrameCallback;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::sleep;

    struct FakeHost {
        foreground:       AtomicBool,
        foreground_calls: AtomicUsize,
        context:          Mutex<Option<Context>>,
        memory_kb:        i64,
    }

    impl FakeHost {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                foreground:       AtomicBool::new(true),
                foreground_calls: AtomicUsize::new(0),
                context:          Mutex::new(Some(Context::new("A", "Home"))),
                memory_kb:        204_800,
            })
        }

        fn set_context(&self, id: &str) {
            *self.context.lock() = Some(Context::new(id, "Page"));
        }
    }

    impl Host for FakeHost {
        fn is_foreground(&self) -> bool {
            self.foreground_calls.fetch_add(1, Ordering::SeqCst);
            self.foreground.load(Ordering::SeqCst)
        }
        fn current_context(&self) -> Option<Context> {
            self.context.lock().clone()
        }
        fn pid(&self) -> u32 {
            4242
        }
        fn available_processors(&self) -> usize {
            4
        }
        fn process_memory_footprint_kb(&self) -> Result<i64> {
            Ok(self.memory_kb)
        }
        fn run_process_listing(&self) -> Result<String> {
            Ok("PID USER %CPU\n4242 app 80%\n".into())
        }
        fn memory_limit_mb(&self) -> Option<f32> {
            Some(512.0)
        }
    }

    #[derive(Default)]
    struct ManualClock {
        pending: Mutex<Vec<FrameCallback>>,
    }

    impl ManualClock {
        fn refresh(&self, times: usize) {
            for _ in 0..times {
                let due = std::mem::take(&mut *self.pending.lock());
                for callback in due {
                    callback(0);
                }
            }
        }
    }

    impl FrameClock for ManualClock {
        fn post_frame_callback(&self, callback: FrameCallback) {
            self.pending.lock().push(callback);
        }
    }

    fn config() -> PerfConfig {
        let mut config = PerfConfig::default();
        config.sampling.cpu_strategy = CpuStrategyKind::Snapshot;
        config
    }

    fn scheduler(
        host: Arc<FakeHost>,
        clock: Arc<ManualClock>,
    ) -> Scheduler<HealthStore> {
        let aggregator = Arc::new(Aggregator::new(HealthStore::new()));
        Scheduler::with_handle(Handle::current(), &config(), host, clock, aggregator)
    }

    fn series_lens(s: &Scheduler<HealthStore>, kind: MetricKind) -> Vec<usize> {
        s.aggregator()
            .with_store(|store| store.series(kind).iter().map(|s| s.len()).collect())
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_sample_and_record() {
        let host = FakeHost::new();
        let s = scheduler(host.clone(), Arc::default());
        s.start(MetricKind::Cpu).unwrap();
        s.start(MetricKind::Memory).unwrap();
        assert!(s.status().is_active(MetricKind::Cpu));

        sleep(Duration::from_millis(1_100)).await;
        assert_eq!(series_lens(&s, MetricKind::Cpu), [2]);
        assert_eq!(series_lens(&s, MetricKind::Memory), [2]);
        assert_eq!(s.last_value(MetricKind::Cpu), 20.0);
        assert_eq!(s.last_value(MetricKind::Memory), 200.0);
        assert_eq!(s.max_memory(), 512.0);
    }

    #[tokio::test(start_paused = true)]
    async fn background_ticks_keep_firing_without_recording() {
        let host = FakeHost::new();
        host.foreground.store(false, Ordering::SeqCst);
        let s = scheduler(host.clone(), Arc::default());
        s.start(MetricKind::Cpu).unwrap();

        sleep(Duration::from_millis(2_100)).await;
        assert_eq!(host.foreground_calls.load(Ordering::SeqCst), 4);
        assert!(series_lens(&s, MetricKind::Cpu).is_empty());
        assert_eq!(s.last_value(MetricKind::Cpu), 0.0);

        // The schedule never stopped: the very next tick samples.
        host.foreground.store(true, Ordering::SeqCst);
        sleep(Duration::from_millis(500)).await;
        assert_eq!(series_lens(&s, MetricKind::Cpu), [1]);
    }

    #[tokio::test(start_paused = true)]
    async fn start_is_idempotent() {
        let s = scheduler(FakeHost::new(), Arc::default());
        s.start(MetricKind::Memory).unwrap();
        s.start(MetricKind::Memory).unwrap();

        sleep(Duration::from_millis(1_100)).await;
        assert_eq!(series_lens(&s, MetricKind::Memory), [2]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_future_ticks_and_keeps_data() {
        let s = scheduler(FakeHost::new(), Arc::default());
        s.start(MetricKind::Memory).unwrap();
        sleep(Duration::from_millis(1_100)).await;

        s.stop(MetricKind::Memory);
        s.stop(MetricKind::Memory);
        assert!(!s.status().is_active(MetricKind::Memory));

        sleep(Duration::from_millis(3_000)).await;
        assert_eq!(series_lens(&s, MetricKind::Memory), [2]);
    }

    #[tokio::test(start_paused = true)]
    async fn frame_rate_is_clamped_per_window() {
        let clock = Arc::new(ManualClock::default());
        let s = scheduler(FakeHost::new(), clock.clone());
        assert_eq!(s.last_value(MetricKind::Fps), 60.0);
        s.start(MetricKind::Fps).unwrap();

        clock.refresh(90);
        sleep(Duration::from_millis(1_001)).await;
        assert_eq!(s.last_value(MetricKind::Fps), 60.0);

        clock.refresh(42);
        sleep(Duration::from_millis(1_000)).await;
        assert_eq!(s.last_value(MetricKind::Fps), 42.0);

        let values: Vec<f32> = s.aggregator().with_store(|store| {
            store.series(MetricKind::Fps)[0].samples.iter().map(|x| x.value).collect()
        });
        assert_eq!(values, [60.0, 42.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn stopping_fps_stops_counting_frames() {
        let clock = Arc::new(ManualClock::default());
        let s = scheduler(FakeHost::new(), clock.clone());
        s.start(MetricKind::Fps).unwrap();
        clock.refresh(5);
        s.stop(MetricKind::Fps);

        clock.refresh(5);
        assert!(clock.pending.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn context_switch_discards_short_series() {
        let host = FakeHost::new();
        let s = scheduler(host.clone(), Arc::default());
        s.start(MetricKind::Memory).unwrap();

        sleep(Duration::from_millis(1_600)).await;
        host.set_context("B");
        sleep(Duration::from_millis(500)).await;

        let open = s.aggregator().open_series(MetricKind::Memory);
        assert_eq!(open.map(|o| (o.context_id, o.len)), Some(("B".into(), 1)));
        assert_eq!(series_lens(&s, MetricKind::Memory), [1]);
    }

    #[tokio::test(start_paused = true)]
    async fn long_run_saturates_at_cap() {
        let s = scheduler(FakeHost::new(), Arc::default());
        s.start(MetricKind::Memory).unwrap();

        sleep(Duration::from_millis(500 * 50 + 100)).await;
        assert_eq!(series_lens(&s, MetricKind::Memory), [MAX_SAMPLES]);
    }

    #[tokio::test(start_paused = true)]
    async fn recording_gate_keeps_readings_live() {
        let s = scheduler(FakeHost::new(), Arc::default());
        s.set_recording(false);
        s.start(MetricKind::Memory).unwrap();

        sleep(Duration::from_millis(600)).await;
        assert_eq!(s.last_value(MetricKind::Memory), 200.0);
        assert!(series_lens(&s, MetricKind::Memory).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_is_final() {
        let s = scheduler(FakeHost::new(), Arc::default());
        s.start(MetricKind::Cpu).unwrap();
        s.shutdown();
        s.shutdown();

        assert!(!s.status().is_active(MetricKind::Cpu));
        assert!(matches!(s.start(MetricKind::Cpu), Err(PerfError::ShutDown)));
    }
}
