//! Errors raised by the launch sequence.

use std::fmt;

use nsinit_common::constants::SETUP_FAILURE_EXIT_CODE;
use nsinit_common::error::NsinitError;
use thiserror::Error;

/// Step of the launch sequence that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LaunchStep {
    /// Allocating the pseudo-terminal.
    Console,
    /// Opening the control channel or the child's standard streams.
    Pipe,
    /// Creating the child process.
    Start,
    /// Writing the pid marker.
    PidFile,
    /// Applying cgroup limits.
    Cgroups,
    /// Creating and wiring the veth pair.
    Network,
    /// Handing the interface name to the child and closing the channel.
    Handshake,
    /// Attaching the host terminal to the console.
    Terminal,
}

impl fmt::Display for LaunchStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Console => "console",
            Self::Pipe => "pipe",
            Self::Start => "start",
            Self::PidFile => "pid file",
            Self::Cgroups => "cgroups",
            Self::Network => "network",
            Self::Handshake => "handshake",
            Self::Terminal => "terminal",
        };
        f.write_str(name)
    }
}

/// Failure of a launch.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// A setup step failed; the child, if started, was killed.
    #[error("{step} setup failed: {source}")]
    Setup {
        /// The failing step.
        step: LaunchStep,
        /// The error reported by the step.
        #[source]
        source: NsinitError,
    },

    /// Waiting for the child failed for a reason other than its exit status.
    #[error("wait for child failed: {source}")]
    Wait {
        /// The underlying error.
        #[source]
        source: NsinitError,
    },
}

impl LaunchError {
    /// Wraps `source` as a failure of `step`.
    #[must_use]
    pub const fn setup(step: LaunchStep, source: NsinitError) -> Self {
        Self::Setup { step, source }
    }

    /// The failing setup step, if any.
    #[must_use]
    pub const fn step(&self) -> Option<LaunchStep> {
        match self {
            Self::Setup { step, .. } => Some(*step),
            Self::Wait { .. } => None,
        }
    }

    /// The error reported by the failing collaborator.
    #[must_use]
    pub const fn cause(&self) -> &NsinitError {
        match self {
            Self::Setup { source, .. } | Self::Wait { source } => source,
        }
    }

    /// Exit code reported alongside this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        SETUP_FAILURE_EXIT_CODE
    }
}

/// Result alias for launch operations.
pub type Result<T> = std::result::Result<T, LaunchError>;

/// Attaches a launch step to fallible collaborator calls.
pub(crate) trait StepExt<T> {
    fn step(self, step: LaunchStep) -> Result<T>;
}

impl<T> StepExt<T> for nsinit_common::error::Result<T> {
    fn step(self, step: LaunchStep) -> Result<T> {
        self.map_err(|source| LaunchError::setup(step, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_error_identifies_step_and_keeps_cause() {
        let err = LaunchError::setup(
            LaunchStep::Cgroups,
            NsinitError::Config {
                message: "boom".into(),
            },
        );
        assert_eq!(err.step(), Some(LaunchStep::Cgroups));
        assert!(matches!(err.cause(), NsinitError::Config { .. }));
        assert_eq!(err.to_string(), "cgroups setup failed: invalid configuration: boom");
        assert_eq!(err.exit_code(), -1);
    }

    #[test]
    fn step_ext_maps_errors() {
        let failed: nsinit_common::error::Result<()> = Err(NsinitError::NotFound {
            kind: "binary",
            id: "ip".into(),
        });
        let err = failed.step(LaunchStep::Network).unwrap_err();
        assert_eq!(err.step(), Some(LaunchStep::Network));
    }
}
