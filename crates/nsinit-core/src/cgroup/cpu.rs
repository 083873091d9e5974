//! CPU resource control via cgroups v2.
//!
//! Manages `cpu.max` and `cpu.weight`.

use std::path::Path;

use nsinit_common::error::Result;

/// Period used for `cpu.max` when only a quota is configured.
pub const DEFAULT_CPU_PERIOD_US: u64 = 100_000;

/// Sets the CPU weight (shares) for a cgroup.
///
/// Weight is a value between 1 and 10000 that controls the relative
/// share of CPU time this cgroup receives under contention.
///
/// # Errors
///
/// Returns an error if writing to `cpu.weight` fails.
pub fn set_cpu_weight(cgroup_path: &Path, weight: u64) -> Result<()> {
    super::write_control(cgroup_path, "cpu.weight", &weight.to_string())?;
    tracing::debug!(weight, "CPU weight set");
    Ok(())
}

/// Sets the CPU bandwidth limit (max microseconds per period).
///
/// Writes `quota_us period_us` to `cpu.max`.
///
/// # Errors
///
/// Returns an error if writing to `cpu.max` fails.
pub fn set_cpu_max(cgroup_path: &Path, quota_us: u64, period_us: u64) -> Result<()> {
    super::write_control(cgroup_path, "cpu.max", &format!("{quota_us} {period_us}"))?;
    tracing::debug!(quota_us, period_us, "CPU max quota set");
    Ok(())
}
