//! Linux-specific host counters using procfs.
//!
//! Provides values `sysinfo` does not expose cheaply:
//! - Network drop counters summed over all interfaces
//! - Process count without a full process table refresh

use tracing::debug;

/// Total dropped packets (received, transmitted) across all interfaces.
pub fn network_drops() -> Option<(u64, u64)> {
    let devices = match procfs::net::dev_status() {
        Ok(devices) => devices,
        Err(e) => {
            debug!(error = %e, "Failed to read /proc/net/dev");
            return None;
        }
    };

    Some(devices.values().fold((0, 0), |(dropin, dropout), dev| {
        (dropin + dev.recv_drop, dropout + dev.sent_drop)
    }))
}

/// Number of processes currently listed under /proc.
pub fn process_count() -> Option<u64> {
    match procfs::process::all_processes() {
        Ok(processes) => Some(processes.count() as u64),
        Err(e) => {
            debug!(error = %e, "Failed to list /proc");
            None
        }
    }
}
