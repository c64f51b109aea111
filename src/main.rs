//! perfwatch — samples this process's CPU, memory, and frame rate into
//! context-keyed health series, then prints them as JSON on exit.
//!
//! Run with:  `RUST_LOG=debug perfwatch [config.toml]`

use anyhow::{Context as _, Result};
use perf_core::{Context, MetricKind};
use perf_health::{Aggregator, HealthStore};
use perf_scheduler::Scheduler;
use perf_system::{format_megabytes, IntervalFrameClock, LinuxHost};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(perf_config::default_path);
    let config = perf_config::load(&path)?;

    // Structured logging — RUST_LOG overrides the configured filter.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .init();

    tracing::info!("perfwatch v{} starting (config: {})", env!("CARGO_PKG_VERSION"), path.display());

    let host = Arc::new(LinuxHost::new(config.sampling.listing_command.clone()));
    host.set_context(Context::new(format!("perfwatch@{}", std::process::id()), "perfwatch"));

    let clock = Arc::new(IntervalFrameClock::spawn(&Handle::current(), config.sampling.refresh_hz));
    let aggregator = Arc::new(Aggregator::new(HealthStore::new()));
    let scheduler = Scheduler::new(&config, host, clock, Arc::clone(&aggregator))
        .context("cannot start scheduler")?;

    for kind in MetricKind::ALL {
        scheduler.start(kind)?;
    }

    let mut report = tokio::time::interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = report.tick() => {
                tracing::info!(
                    "cpu {:.1}%  memory {}  fps {:.0}",
                    scheduler.last_value(MetricKind::Cpu),
                    format_megabytes(scheduler.last_value(MetricKind::Memory)),
                    scheduler.last_value(MetricKind::Fps),
                );
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    scheduler.shutdown();
    let snapshot = aggregator.with_store(HealthStore::snapshot);
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
