//! [`NetworkPrimitives`] backed by the iproute2 `ip` binary.

use std::path::PathBuf;
use std::process::Command;

use nsinit_common::error::{NsinitError, Result};

use super::NetworkPrimitives;

/// A single `ip link` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkCommand<'a> {
    /// `ip link add <host> type veth peer name <peer>`
    AddVeth {
        /// Host-side name.
        host: &'a str,
        /// Peer name.
        peer: &'a str,
    },
    /// `ip link set <iface> master <bridge>`
    SetMaster {
        /// Interface to attach.
        iface: &'a str,
        /// Bridge to attach it to.
        bridge: &'a str,
    },
    /// `ip link set <iface> nomaster`
    ClearMaster(&'a str),
    /// `ip link set <iface> up`
    Up(&'a str),
    /// `ip link set <iface> down`
    Down(&'a str),
    /// `ip link set <iface> netns <pid>`
    MoveToNamespace {
        /// Interface to move.
        iface: &'a str,
        /// Process whose network namespace receives it.
        pid: u32,
    },
    /// `ip link delete <iface>`
    Delete(&'a str),
}

impl<'a> LinkCommand<'a> {
    /// Short operation name used in errors and logs.
    #[must_use]
    pub const fn op(&self) -> &'static str {
        match self {
            Self::AddVeth { .. } => "create veth pair",
            Self::SetMaster { .. } => "set master",
            Self::ClearMaster(_) => "clear master",
            Self::Up(_) => "set up",
            Self::Down(_) => "set down",
            Self::MoveToNamespace { .. } => "move to namespace",
            Self::Delete(_) => "delete",
        }
    }

    /// Interface the command primarily targets.
    #[must_use]
    pub const fn interface(&self) -> &'a str {
        match *self {
            Self::AddVeth { host, .. } => host,
            Self::SetMaster { iface, .. } | Self::MoveToNamespace { iface, .. } => iface,
            Self::ClearMaster(iface) | Self::Up(iface) | Self::Down(iface) | Self::Delete(iface) => {
                iface
            }
        }
    }

    /// Arguments passed to the `ip` binary.
    #[must_use]
    pub fn args(&self) -> Vec<String> {
        let pid;
        let args: Vec<&str> = match *self {
            Self::AddVeth { host, peer } => {
                vec!["link", "add", host, "type", "veth", "peer", "name", peer]
            }
            Self::SetMaster { iface, bridge } => vec!["link", "set", iface, "master", bridge],
            Self::ClearMaster(iface) => vec!["link", "set", iface, "nomaster"],
            Self::Up(iface) => vec!["link", "set", iface, "up"],
            Self::Down(iface) => vec!["link", "set", iface, "down"],
            Self::MoveToNamespace { iface, pid: target } => {
                pid = target.to_string();
                vec!["link", "set", iface, "netns", &pid]
            }
            Self::Delete(iface) => vec!["link", "delete", iface],
        };
        args.into_iter().map(str::to_string).collect()
    }
}

/// Drives interface primitives through `ip link`.
#[derive(Debug, Clone)]
pub struct IpRoute {
    binary: PathBuf,
}

impl IpRoute {
    /// Uses the given `ip` binary.
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Locates `ip` on `PATH`.
    ///
    /// # Errors
    ///
    /// Returns [`NsinitError::NotFound`] if no `ip` binary is installed.
    pub fn locate() -> Result<Self> {
        let binary = which::which("ip").map_err(|_| NsinitError::NotFound {
            kind: "binary",
            id: "ip".into(),
        })?;
        tracing::debug!(binary = %binary.display(), "located iproute2");
        Ok(Self { binary })
    }

    fn run(&self, command: &LinkCommand<'_>) -> Result<()> {
        let args = command.args();
        tracing::debug!(op = command.op(), args = ?args, "ip");
        let output = Command::new(&self.binary)
            .args(&args)
            .output()
            .map_err(|e| NsinitError::Io {
                path: self.binary.clone(),
                source: e,
            })?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(classify_failure(command, stderr))
    }
}

impl Default for IpRoute {
    fn default() -> Self {
        Self::new("ip")
    }
}

/// Maps a failed invocation to an error, singling out name collisions.
fn classify_failure(command: &LinkCommand<'_>, stderr: String) -> NsinitError {
    if let LinkCommand::AddVeth { host, .. } = *command {
        if stderr.contains("File exists") {
            return NsinitError::InterfaceExists {
                name: host.to_string(),
            };
        }
    }
    NsinitError::Network {
        op: command.op(),
        interface: command.interface().to_string(),
        message: stderr,
    }
}

impl NetworkPrimitives for IpRoute {
    fn create_veth_pair(&self, host: &str, peer: &str) -> Result<()> {
        self.run(&LinkCommand::AddVeth { host, peer })
    }

    fn set_master(&self, iface: &str, bridge: &str) -> Result<()> {
        self.run(&LinkCommand::SetMaster { iface, bridge })
    }

    fn clear_master(&self, iface: &str) -> Result<()> {
        self.run(&LinkCommand::ClearMaster(iface))
    }

    fn set_up(&self, iface: &str) -> Result<()> {
        self.run(&LinkCommand::Up(iface))
    }

    fn set_down(&self, iface: &str) -> Result<()> {
        self.run(&LinkCommand::Down(iface))
    }

    fn move_to_namespace(&self, iface: &str, pid: u32) -> Result<()> {
        self.run(&LinkCommand::MoveToNamespace { iface, pid })
    }

    fn delete(&self, iface: &str) -> Result<()> {
        self.run(&LinkCommand::Delete(iface))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_veth_args() {
        let cmd = LinkCommand::AddVeth {
            host: "vetha1b2",
            peer: "vethc3d4",
        };
        assert_eq!(
            cmd.args(),
            ["link", "add", "vetha1b2", "type", "veth", "peer", "name", "vethc3d4"]
        );
    }

    #[test]
    fn move_to_namespace_args_carry_pid() {
        let cmd = LinkCommand::MoveToNamespace {
            iface: "vethc3d4",
            pid: 31337,
        };
        assert_eq!(cmd.args(), ["link", "set", "vethc3d4", "netns", "31337"]);
        assert_eq!(cmd.interface(), "vethc3d4");
    }

    #[test]
    fn master_args() {
        let set = LinkCommand::SetMaster {
            iface: "vetha1b2",
            bridge: "br0",
        };
        assert_eq!(set.args(), ["link", "set", "vetha1b2", "master", "br0"]);
        assert_eq!(
            LinkCommand::ClearMaster("vetha1b2").args(),
            ["link", "set", "vetha1b2", "nomaster"]
        );
    }

    #[test]
    fn file_exists_on_add_is_a_collision() {
        let cmd = LinkCommand::AddVeth {
            host: "vetha1b2",
            peer: "vethc3d4",
        };
        let err = classify_failure(&cmd, "RTNETLINK answers: File exists".into());
        assert!(err.is_interface_exists());
    }

    #[test]
    fn other_failures_name_the_operation() {
        let err = classify_failure(&LinkCommand::Up("vetha1b2"), "Cannot find device".into());
        match err {
            NsinitError::Network {
                op,
                interface,
                message,
            } => {
                assert_eq!(op, "set up");
                assert_eq!(interface, "vetha1b2");
                assert_eq!(message, "Cannot find device");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_binary_is_an_io_error() {
        let ip = IpRoute::new("/nonexistent/ip");
        let err = ip.set_up("lo").unwrap_err();
        assert!(matches!(err, NsinitError::Io { .. }));
    }
}
