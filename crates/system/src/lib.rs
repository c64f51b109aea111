//! Samplers for process CPU, memory footprint, and frame rate, plus the
//! host primitives they read from.

pub mod cpu;
pub mod fps;
pub mod host;
pub mod memory;

pub use cpu::{parse_process_listing, CpuSampler, KernelCounters};
pub use fps::{FrameCallback, FrameClock, FrameCounter, FrameLoop, IntervalFrameClock};
pub use host::{Host, LinuxHost};
pub use memory::{format_megabytes, sample_memory};
