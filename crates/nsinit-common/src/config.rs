//! Container configuration model.
//!
//! The configuration is owned by the caller and read-only to the launch
//! sequence. It is stored as JSON next to the container, by default in
//! `container.json`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CGROUP_PARENT, DEFAULT_VETH_PREFIX, MAX_INTERFACE_NAME_LEN, VETH_SUFFIX_LEN,
};
use crate::error::{NsinitError, Result};

/// Root configuration of a container launch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Namespaces the child is created in.
    pub namespaces: NamespaceConfig,
    /// Resource limits applied to the child, if any.
    pub cgroups: Option<CgroupConfig>,
    /// Private network setup, if any.
    pub network: Option<NetworkConfig>,
}

/// Which namespaces to isolate the child in.
///
/// An absent `namespaces` section means [`NamespaceConfig::default`]; inside
/// a present section, omitted namespaces are not isolated.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceConfig {
    /// Isolate PID namespace.
    #[serde(default)]
    pub pid: bool,
    /// Isolate mount namespace.
    #[serde(default)]
    pub mount: bool,
    /// Isolate network namespace.
    #[serde(default)]
    pub network: bool,
    /// Isolate user namespace.
    #[serde(default)]
    pub user: bool,
    /// Isolate IPC namespace.
    #[serde(default)]
    pub ipc: bool,
    /// Isolate UTS (hostname) namespace.
    #[serde(default)]
    pub uts: bool,
}

impl NamespaceConfig {
    /// A configuration requesting no isolation at all.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            pid: false,
            mount: false,
            network: false,
            user: false,
            ipc: false,
            uts: false,
        }
    }
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            pid: true,
            mount: true,
            network: true,
            user: false,
            ipc: true,
            uts: true,
        }
    }
}

/// Cgroup v2 placement and limits for the child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CgroupConfig {
    /// Name of the container's cgroup.
    pub name: String,
    /// Parent cgroup, relative to the hierarchy root.
    #[serde(default = "default_cgroup_parent")]
    pub parent: String,
    /// Hard memory limit in bytes (`memory.max`).
    #[serde(default)]
    pub memory: Option<u64>,
    /// Memory throttling threshold in bytes (`memory.high`).
    #[serde(default)]
    pub memory_high: Option<u64>,
    /// Relative CPU weight, 1-10000 (`cpu.weight`).
    #[serde(default)]
    pub cpu_shares: Option<u64>,
    /// CPU time allowed per period, in microseconds (`cpu.max`).
    #[serde(default)]
    pub cpu_quota: Option<u64>,
    /// Length of the CPU bandwidth period, in microseconds.
    #[serde(default)]
    pub cpu_period: Option<u64>,
    /// Relative I/O weight, 1-10000 (`io.weight`).
    #[serde(default)]
    pub io_weight: Option<u16>,
    /// Maximum number of tasks (`pids.max`).
    #[serde(default)]
    pub pids_max: Option<u64>,
}

impl CgroupConfig {
    /// Creates a cgroup configuration with no limits set.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: default_cgroup_parent(),
            memory: None,
            memory_high: None,
            cpu_shares: None,
            cpu_quota: None,
            cpu_period: None,
            io_weight: None,
            pids_max: None,
        }
    }
}

/// Private network attached to the child through a veth pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Bridge the host side of the pair is attached to.
    pub bridge: String,
    /// Prefix of the generated interface names.
    #[serde(default = "default_veth_prefix")]
    pub prefix: String,
}

impl NetworkConfig {
    /// Creates a network configuration for the given bridge.
    #[must_use]
    pub fn new(bridge: impl Into<String>) -> Self {
        Self {
            bridge: bridge.into(),
            prefix: default_veth_prefix(),
        }
    }
}

fn default_cgroup_parent() -> String {
    DEFAULT_CGROUP_PARENT.to_string()
}

fn default_veth_prefix() -> String {
    DEFAULT_VETH_PREFIX.to_string()
}

impl ContainerConfig {
    /// Loads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| NsinitError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for combinations the launch cannot honor.
    ///
    /// # Errors
    ///
    /// Returns [`NsinitError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if let Some(network) = &self.network {
            if !self.namespaces.network {
                return Err(config_error(
                    "network is configured but the network namespace is not isolated",
                ));
            }
            if network.bridge.is_empty() {
                return Err(config_error("network bridge name is empty"));
            }
            if network.prefix.is_empty()
                || network.prefix.len() + VETH_SUFFIX_LEN > MAX_INTERFACE_NAME_LEN
            {
                return Err(config_error(format!(
                    "veth prefix {:?} must be 1-{} bytes",
                    network.prefix,
                    MAX_INTERFACE_NAME_LEN - VETH_SUFFIX_LEN
                )));
            }
        }
        if let Some(cgroups) = &self.cgroups {
            if cgroups.name.is_empty() || cgroups.name.contains('/') {
                return Err(config_error(format!(
                    "invalid cgroup name {:?}",
                    cgroups.name
                )));
            }
            if let Some(weight) = cgroups.cpu_shares {
                if !(1..=10_000).contains(&weight) {
                    return Err(config_error(format!(
                        "cpu_shares {weight} outside 1-10000"
                    )));
                }
            }
            if let Some(weight) = cgroups.io_weight {
                if !(1..=10_000).contains(&weight) {
                    return Err(config_error(format!("io_weight {weight} outside 1-10000")));
                }
            }
            if cgroups.cpu_period.is_some() && cgroups.cpu_quota.is_none() {
                return Err(config_error("cpu_period requires cpu_quota"));
            }
        }
        Ok(())
    }
}

fn config_error(message: impl Into<String>) -> NsinitError {
    NsinitError::Config {
        message: message.into(),
    }
}
