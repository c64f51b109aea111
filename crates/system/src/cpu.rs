use crate::host::Host;
use perf_config::CpuStrategyKind;
use perf_core::{PerfError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use tracing::{debug, info, warn};

/// Process CPU usage sampler. The strategy is fixed at construction.
pub enum CpuSampler {
    /// Parse the process-listing tool's output each tick.
    Snapshot,
    /// Delta of the kernel tick counters between consecutive ticks.
    Counters(KernelCounters<File>),
}

impl CpuSampler {
    /// Pick a strategy. `Auto` and `Counters` fall back to the snapshot
    /// strategy when the kernel counters cannot be opened.
    pub fn select(strategy: CpuStrategyKind, pid: u32) -> Self {
        if strategy == CpuStrategyKind::Snapshot {
            info!("CPU sampler: process-listing snapshot");
            return CpuSampler::Snapshot;
        }

        match KernelCounters::open(pid) {
            Ok(counters) => {
                info!("CPU sampler: kernel counter delta");
                CpuSampler::Counters(counters)
            }
            Err(e) => {
                if strategy == CpuStrategyKind::Counters {
                    warn!("kernel counters unavailable ({e}); using process listing");
                } else {
                    debug!("kernel counters unavailable ({e}); using process listing");
                }
                CpuSampler::Snapshot
            }
        }
    }

    /// Take one reading in percent.
    ///
    /// `None` means the tick failed and should not be recorded. The snapshot
    /// strategy reports failures as `Some(0.0)`; the counter strategy skips
    /// them so a bad read cannot poison the next delta.
    pub fn sample(&mut self, host: &dyn Host) -> Option<f32> {
        match self {
            CpuSampler::Snapshot => Some(sample_snapshot(host)),
            CpuSampler::Counters(counters) => match counters.sample() {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("CPU counter sample skipped: {e}");
                    None
                }
            },
        }
    }
}

fn sample_snapshot(host: &dyn Host) -> f32 {
    let listing = match host.run_process_listing() {
        Ok(text) => text,
        Err(e) => {
            warn!("process listing failed: {e}");
            return 0.0;
        }
    };

    parse_process_listing(&listing, host.pid(), host.available_processors()).unwrap_or_else(|| {
        warn!(pid = host.pid(), "process not found in listing");
        0.0
    })
}

/// Locate `pid`'s row in a `top`-style table and return its CPU share,
/// normalised by `processors`.
///
/// The CPU column is taken from the most recent header line containing
/// `CPU`; rows before any header are ignored.
pub fn parse_process_listing(text: &str, pid: u32, processors: usize) -> Option<f32> {
    let pid = pid.to_string();
    let mut cpu_column: Option<usize> = None;

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if line.contains("CPU") {
            if let Some(i) = line.split_whitespace().position(|t| t.contains("CPU")) {
                cpu_column = Some(i);
                continue;
            }
        }

        let mut tokens = line.split_whitespace();
        if tokens.next() != Some(pid.as_str()) {
            continue;
        }
        let Some(column) = cpu_column else { continue };
        let Some(raw) = line.split_whitespace().nth(column) else { continue };

        let percent: f32 = raw.trim_end_matches('%').parse().ok()?;
        return Some(percent / processors.max(1) as f32);
    }

    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ticks {
    system:  u64,
    process: u64,
}

/// Long-lived handles on the system-wide and per-process tick counters.
///
/// Files are opened once; each sample seeks back to the start and re-reads.
pub struct KernelCounters<R> {
    system:  BufReader<R>,
    process: BufReader<R>,
    last:    Option<Ticks>,
}

impl KernelCounters<File> {
    pub fn open(pid: u32) -> Result<Self> {
        let system = File::open("/proc/stat")?;
        let process = File::open(format!("/proc/{pid}/stat"))?;
        Ok(Self::from_readers(system, process))
    }
}

impl<R: Read + Seek> KernelCounters<R> {
    pub fn from_readers(system: R, process: R) -> Self {
        Self {
            system:  BufReader::new(system),
            process: BufReader::new(process),
            last:    None,
        }
    }

    /// CPU share of this process since the previous call, in percent.
    ///
    /// The first successful call only primes the counters and returns 0.
    /// Both counters must be read and parsed before any stored state is
    /// touched, so a failed read never pairs a stale numerator with a fresh
    /// denominator.
    pub fn sample(&mut self) -> Result<f32> {
        let system = parse_system_ticks(&first_line(&mut self.system)?)?;
        let process = parse_process_ticks(&first_line(&mut self.process)?)?;
        let now = Ticks { system, process };

        let Some(prev) = self.last else {
            self.last = Some(now);
            return Ok(0.0);
        };

        let (Some(sys_delta), Some(app_delta)) = (
            now.system.checked_sub(prev.system),
            now.process.checked_sub(prev.process),
        ) else {
            // Counters went backwards; start over from here.
            self.last = Some(now);
            return Err(PerfError::Sampler("tick counters went backwards".into()));
        };

        if sys_delta == 0 {
            return Err(PerfError::Sampler("system ticks did not advance".into()));
        }

        self.last = Some(now);
        Ok(app_delta as f32 / sys_delta as f32 * 100.0)
    }
}

fn first_line<R: Read + Seek>(reader: &mut BufReader<R>) -> Result<String> {
    reader.seek(SeekFrom::Start(0))?;
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Err(PerfError::Parse("counter file is empty".into()));
    }
    Ok(line)
}

/// Sum of the first seven time fields (user .. softirq) of the aggregate
/// `cpu` line in `/proc/stat`.
pub fn parse_system_ticks(line: &str) -> Result<u64> {
    let mut fields = line.split_whitespace();
    if fields.next() != Some("cpu") {
        return Err(PerfError::Parse(format!("not an aggregate cpu line: {line:?}")));
    }

    let mut total = 0u64;
    for i in 0..7 {
        let field = fields
            .next()
            .ok_or_else(|| PerfError::Parse(format!("cpu line has only {i} time fields")))?;
        total += field
            .parse::<u64>()
            .map_err(|e| PerfError::Parse(format!("cpu field {field:?}: {e}")))?;
    }
    Ok(total)
}

/// `utime + stime` from a `/proc/<pid>/stat` line.
///
/// Fields are counted after the closing paren of `comm`, which may itself
/// contain spaces.
pub fn parse_process_ticks(line: &str) -> Result<u64> {
    let close = line
        .rfind(')')
        .ok_or_else(|| PerfError::Parse("no comm field in process stat".into()))?;

    // Field 3 (state) is the first token after `comm`; utime and stime are
    // fields 14 and 15.
    let mut fields = line[close + 1..].split_whitespace().skip(11);
    let mut next = |name: &str| -> Result<u64> {
        let raw = fields
            .next()
            .ok_or_else(|| PerfError::Parse(format!("process stat has no {name}")))?;
        raw.parse()
            .map_err(|e| PerfError::Parse(format!("{name} {raw:?}: {e}")))
    };

    let utime = next("utime")?;
    let stime = next("stime")?;
    Ok(utime + stime)
}
