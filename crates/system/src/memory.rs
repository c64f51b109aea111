use crate::host::Host;
use tracing::warn;

/// Query the host's memory footprint and convert it to megabytes.
///
/// Failures and negative totals read as 0.
pub fn sample_memory(host: &dyn Host) -> f32 {
    match host.process_memory_footprint_kb() {
        Ok(kb) if kb >= 0 => kb as f32 / 1024.0,
        Ok(kb) => {
            warn!(kb, "negative memory footprint reported");
            0.0
        }
        Err(e) => {
            warn!("memory footprint query failed: {e}");
            0.0
        }
    }
}

/// Format a megabyte reading as a human-readable string (e.g. `"1.2 GiB"`).
pub fn format_megabytes(mb: f32) -> String {
    if mb >= 1024.0 {
        format!("{:.1} GiB", mb / 1024.0)
    } else if mb >= 1.0 {
        format!("{mb:.1} MiB")
    } else {
        format!("{:.0} KiB", mb * 1024.0)
    }
}
