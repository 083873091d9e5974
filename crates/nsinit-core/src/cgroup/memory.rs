//! Memory resource control via cgroups v2.
//!
//! Manages `memory.max` and `memory.high`.

use std::path::Path;

use nsinit_common::error::Result;

/// Sets the hard memory limit for a cgroup.
///
/// # Errors
///
/// Returns an error if writing to `memory.max` fails.
pub fn set_memory_max(cgroup_path: &Path, bytes: u64) -> Result<()> {
    super::write_control(cgroup_path, "memory.max", &bytes.to_string())?;
    tracing::debug!(bytes, "memory max set");
    Ok(())
}

/// Sets the memory high watermark (throttling threshold).
///
/// # Errors
///
/// Returns an error if writing to `memory.high` fails.
pub fn set_memory_high(cgroup_path: &Path, bytes: u64) -> Result<()> {
    super::write_control(cgroup_path, "memory.high", &bytes.to_string())?;
    tracing::debug!(bytes, "memory high watermark set");
    Ok(())
}
