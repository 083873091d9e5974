//! Domain primitive types used across the nsinit workspace.

use std::fmt;

/// State of a single launch.
///
/// `Starting -> Configuring -> Running -> Exited`, with any failure during
/// `Starting` or `Configuring` moving straight to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LaunchState {
    /// The console is being allocated and the child created.
    Starting,
    /// Cgroup limits and networking are being applied.
    Configuring,
    /// The child is running with the terminal relay attached.
    Running,
    /// The child terminated.
    Exited,
    /// Setup failed and the child was killed.
    Failed,
}

impl fmt::Display for LaunchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Configuring => write!(f, "configuring"),
            Self::Running => write!(f, "running"),
            Self::Exited => write!(f, "exited"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Names of a virtual ethernet pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VethPair {
    /// Interface that stays on the host and joins the bridge.
    pub host: String,
    /// Interface moved into the container's network namespace.
    pub peer: String,
}

impl fmt::Display for VethPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<->{}", self.host, self.peer)
    }
}
