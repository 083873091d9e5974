//! I/O resource control via cgroups v2.

use std::path::Path;

use nsinit_common::error::Result;

/// Sets the default I/O weight for a cgroup.
///
/// # Errors
///
/// Returns an error if writing to `io.weight` fails.
pub fn set_io_weight(cgroup_path: &Path, weight: u16) -> Result<()> {
    super::write_control(cgroup_path, "io.weight", &format!("default {weight}"))?;
    tracing::debug!(weight, "I/O weight set");
    Ok(())
}
