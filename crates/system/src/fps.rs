use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::debug;

/// One-shot callback invoked on the next display refresh with the frame
/// time in nanoseconds.
pub type FrameCallback = Box<dyn FnOnce(u64) + Send + 'static>;

/// The host's display-refresh callback API.
///
/// A posted callback fires at most once; callers re-post to keep receiving
/// refreshes.
pub trait FrameClock: Send + Sync {
    fn post_frame_callback(&self, callback: FrameCallback);
}

/// Frames counted since the last reporting window closed.
#[derive(Debug, Default)]
pub struct FrameCounter {
    frames: AtomicU32,
}

impl FrameCounter {
    pub fn on_frame(&self) {
        self.frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Read and reset the counter, clamping the reading to `max`.
    ///
    /// A window can straddle two fractional refresh cycles and over-count,
    /// so values above the display cap are measurement artifacts.
    pub fn take(&self, max: u32) -> u32 {
        self.frames.swap(0, Ordering::Relaxed).min(max)
    }
}

/// Keeps a frame callback registered with a [`FrameClock`], counting each
/// refresh into a [`FrameCounter`].
///
/// Every callback checks that its arming is still current before it counts
/// or re-registers, so `disarm` stops the loop at the next refresh and a
/// quick disarm/arm never leaves two chains running.
pub struct FrameLoop {
    clock:      Arc<dyn FrameClock>,
    counter:    Arc<FrameCounter>,
    generation: Arc<AtomicU64>,
}

impl FrameLoop {
    pub fn new(clock: Arc<dyn FrameClock>) -> Self {
        Self {
            clock,
            counter:    Arc::new(FrameCounter::default()),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn counter(&self) -> &Arc<FrameCounter> {
        &self.counter
    }

    pub fn arm(&self) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.counter.take(u32::MAX);
        post(
            Arc::clone(&self.clock),
            Arc::clone(&self.counter),
            Arc::clone(&self.generation),
            generation,
        );
    }

    pub fn disarm(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }
}

fn post(
    clock: Arc<dyn FrameClock>,
    counter: Arc<FrameCounter>,
    current: Arc<AtomicU64>,
    generation: u64,
) {
    let next_clock = Arc::clone(&clock);
    clock.post_frame_callback(Box::new(move |_frame_nanos| {
        if current.load(Ordering::Acquire) != generation {
            return;
        }
        counter.on_frame();
        if current.load(Ordering::Acquire) == generation {
            post(next_clock, counter, current, generation);
        }
    }));
}

/// A [`FrameClock`] driven by a tokio interval, for hosts without a
/// compositor to hand out refresh callbacks.
pub struct IntervalFrameClock {
    pending: Arc<Mutex<Vec<FrameCallback>>>,
    task:    JoinHandle<()>,
}

impl IntervalFrameClock {
    pub fn spawn(handle: &Handle, refresh_hz: u32) -> Self {
        let pending: Arc<Mutex<Vec<FrameCallback>>> = Arc::default();
        let period = Duration::from_secs(1) / refresh_hz.max(1);
        let queue = Arc::clone(&pending);

        let task = handle.spawn(async move {
            let start = Instant::now();
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                let due = std::mem::take(&mut *queue.lock());
                let frame_nanos = start.elapsed().as_nanos() as u64;
                for callback in due {
                    callback(frame_nanos);
                }
            }
        });

        debug!(refresh_hz, "frame clock started");
        Self { pending, task }
    }
}

impl FrameClock for IntervalFrameClock {
    fn post_frame_callback(&self, callback: FrameCallback) {
        self.pending.lock().push(callback);
    }
}

impl Drop for IntervalFrameClock {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Refreshes happen only when the test calls `refresh`.
    #[derive(Default)]
    struct ManualClock {
        pending: Mutex<Vec<FrameCallback>>,
    }

    impl ManualClock {
        fn refresh(&self) {
            let due = std::mem::take(&mut *self.pending.lock());
            for callback in due {
                callback(0);
            }
        }

        fn pending(&self) -> usize {
            self.pending.lock().len()
        }
    }

    impl FrameClock for ManualClock {
        fn post_frame_callback(&self, callback: FrameCallback) {
            self.pending.lock().push(callback);
        }
    }

    #[test]
    fn take_clamps_and_resets() {
        let counter = FrameCounter::default();
        for _ in 0..75 {
            counter.on_frame();
        }
        assert_eq!(counter.take(60), 60);
        assert_eq!(counter.take(60), 0);
    }

    #[test]
    fn armed_loop_counts_every_refresh() {
        let clock = Arc::new(ManualClock::default());
        let frames = FrameLoop::new(clock.clone());
        frames.arm();

        for _ in 0..5 {
            clock.refresh();
        }
        assert_eq!(frames.counter().take(60), 5);
        assert_eq!(clock.pending(), 1);
    }

    #[test]
    fn disarm_stops_reregistration() {
        let clock = Arc::new(ManualClock::default());
        let frames = FrameLoop::new(clock.clone());
        frames.arm();
        clock.refresh();
        frames.disarm();

        clock.refresh();
        assert_eq!(clock.pending(), 0);
        assert_eq!(frames.counter().take(60), 1);
    }

    #[test]
    fn rearm_does_not_double_count() {
        let clock = Arc::new(ManualClock::default());
        let frames = FrameLoop::new(clock.clone());
        frames.arm();
        frames.disarm();
        frames.arm();

        // The stale callback from the first arming is still queued.
        assert_eq!(clock.pending(), 2);
        for _ in 0..3 {
            clock.refresh();
        }
        assert_eq!(frames.counter().take(60), 3);
        assert_eq!(clock.pending(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn interval_clock_fires_posted_callbacks() {
        let clock = Arc::new(IntervalFrameClock::spawn(&Handle::current(), 100));
        let frames = FrameLoop::new(clock.clone());
        frames.arm();

        time::sleep(Duration::from_millis(105)).await;
        let counted = frames.counter().take(1000);
        assert!((9..=11).contains(&counted), "counted {counted}");
    }
}
