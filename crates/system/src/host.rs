use parking_lot::{Mutex, RwLock};
use perf_core::{Context, PerfError, Result};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::debug;

/// Primitives the collector needs from the process it runs inside.
///
/// Every call is synchronous and local. Implementations must be cheap enough
/// to call from a sampling tick.
pub trait Host: Send + Sync {
    /// Whether the application is currently in the foreground.
    fn is_foreground(&self) -> bool;

    /// The currently visible navigation context, if any.
    fn current_context(&self) -> Option<Context>;

    /// Process id used to locate this process in listings and `/proc`.
    fn pid(&self) -> u32;

    /// Number of processing units available to the process.
    fn available_processors(&self) -> usize;

    /// Proportional memory footprint of this process, in kilobytes.
    fn process_memory_footprint_kb(&self) -> Result<i64>;

    /// Raw text output of the external process-listing tool.
    fn run_process_listing(&self) -> Result<String>;

    /// Per-process memory budget in megabytes, when the platform has one.
    fn memory_limit_mb(&self) -> Option<f32> {
        None
    }
}

/// [`Host`] implementation for the current Linux process.
///
/// Foreground state and the navigation context are pushed in by the
/// embedding application; everything else is read from the system.
pub struct LinuxHost {
    pid:             u32,
    processors:      usize,
    listing_command: Vec<String>,
    foreground:      AtomicBool,
    context:         RwLock<Option<Context>>,
    sys:             Mutex<System>,
}

impl LinuxHost {
    pub fn new(listing_command: Vec<String>) -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_all();
        let processors = sys.cpus().len().max(1);

        Self {
            pid: std::process::id(),
            processors,
            listing_command,
            foreground: AtomicBool::new(true),
            context: RwLock::new(None),
            sys: Mutex::new(sys),
        }
    }

    pub fn set_foreground(&self, foreground: bool) {
        self.foreground.store(foreground, Ordering::Release);
    }

    pub fn set_context(&self, context: Context) {
        debug!(id = %context.id, page = %context.page, "context changed");
        *self.context.write() = Some(context);
    }

    /// Resident set size via `sysinfo`, in kilobytes.
    fn resident_kb(&self) -> Option<i64> {
        let pid = Pid::from_u32(self.pid);
        let mut sys = self.sys.lock();
        sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        sys.process(pid).map(|p| (p.memory() / 1024) as i64)
    }
}

impl Host for LinuxHost {
    fn is_foreground(&self) -> bool {
        self.foreground.load(Ordering::Acquire)
    }

    fn current_context(&self) -> Option<Context> {
        self.context.read().clone()
    }

    fn pid(&self) -> u32 {
        self.pid
    }

    fn available_processors(&self) -> usize {
        self.processors
    }

    fn process_memory_footprint_kb(&self) -> Result<i64> {
        // PSS is self-only detail; no access to other processes is needed.
        match std::fs::read_to_string("/proc/self/smaps_rollup") {
            Ok(raw) => {
                if let Some(kb) = parse_pss_kb(&raw) {
                    return Ok(kb);
                }
                debug!("no Pss line in smaps_rollup; falling back to RSS");
            }
            Err(e) => debug!("smaps_rollup unavailable ({e}); falling back to RSS"),
        }

        self.resident_kb()
            .ok_or_else(|| PerfError::Sampler(format!("process {} not found", self.pid)))
    }

    fn run_process_listing(&self) -> Result<String> {
        let (program, args) = self
            .listing_command
            .split_first()
            .ok_or_else(|| PerfError::Sampler("empty listing command".into()))?;

        let output = Command::new(program).args(args).output()?;
        if !output.status.success() {
            return Err(PerfError::Sampler(format!(
                "'{program}' exited with {}",
                output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn memory_limit_mb(&self) -> Option<f32> {
        let mut sys = self.sys.lock();
        sys.refresh_memory();
        let total = sys.total_memory();
        (total > 0).then(|| (total as f64 / (1024.0 * 1024.0)) as f32)
    }
}

/// Extract the `Pss:` total (kB) from `/proc/<pid>/smaps_rollup` text.
pub fn parse_pss_kb(raw: &str) -> Option<i64> {
    raw.lines()
        .find_map(|line| line.strip_prefix("Pss:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kb| kb.parse().ok())
}
