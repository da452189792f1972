//! Server-mode singleton guard
//!
//! Refuses to start a second worker against the same PID file. Process
//! detachment itself (forking, session setup) is left to the service
//! supervisor; this module only arbitrates who owns the PID file.

use anyhow::{Context, Result, bail};
use std::fs;
use std::path::Path;

/// Checks the PID file and claims it for this process.
///
/// A stale file (unparseable, or naming a dead process) is overwritten; a
/// live one aborts startup.
pub fn acquire(path: &Path) -> Result<()> {
    if let Some(pid) = read_pid(path) {
        if process_alive(pid) {
            bail!(
                "worker already running with pid {pid} (per {})",
                path.display()
            );
        }
    }

    fs::write(path, std::process::id().to_string())
        .with_context(|| format!("failed to write PID file {}", path.display()))?;
    Ok(())
}

fn read_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    false
}
