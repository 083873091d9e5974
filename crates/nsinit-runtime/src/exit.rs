//! Exit status translation.

use nix::sys::wait::WaitStatus;

use crate::error::{LaunchError, Result};
use crate::process::LaunchedProcess;

/// Exit code reported for a child that did not exit normally.
pub const ABNORMAL_EXIT_CODE: i32 = -1;

/// Converts a terminal wait status into an exit code.
///
/// Normal termination yields the child's own code. Death by a signal yields
/// [`ABNORMAL_EXIT_CODE`], as does any non-terminal status.
#[must_use]
pub const fn exit_code(status: WaitStatus) -> i32 {
    match status {
        WaitStatus::Exited(_, code) => code,
        _ => ABNORMAL_EXIT_CODE,
    }
}

/// Blocks until `process` terminates and returns its exit code.
///
/// A non-zero exit or a death by signal is not an error.
///
/// # Errors
///
/// Returns [`LaunchError::Wait`] if waiting itself fails.
pub fn wait(process: &mut LaunchedProcess) -> Result<i32> {
    let status = process
        .wait_status()
        .map_err(|source| LaunchError::Wait { source })?;
    if let WaitStatus::Signaled(_, signal, core_dumped) = status {
        tracing::info!(pid = process.pid(), signal = %signal, core_dumped, "child killed by signal");
    }
    let code = exit_code(status);
    tracing::info!(pid = process.pid(), status = ?status, code, "child exited");
    Ok(code)
}
