//! Cgroups v2 resource management.
//!
//! Creates the container's cgroup under the unified hierarchy, writes the
//! configured limits for CPU, memory, I/O and task count, and moves the
//! child into it.
//!
//! A cgroup only exposes a controller's files when every ancestor below the
//! root lists that controller in `cgroup.subtree_control`, so the manager
//! enables the controllers its limits need along the path first.

pub mod cpu;
pub mod io;
pub mod memory;
pub mod pids;

use std::path::{Path, PathBuf};

use nsinit_common::config::CgroupConfig;
use nsinit_common::error::{NsinitError, Result};

/// Places a launched process under resource control.
///
/// `apply` runs exactly once per launch, after the child has started and
/// before any network namespace operation.
pub trait ResourceLimiter {
    /// Applies the configured limits to `pid`.
    ///
    /// # Errors
    ///
    /// Returns an error if the process could not be placed under control.
    fn apply(&self, pid: u32) -> Result<()>;

    /// Releases whatever `apply` created once the process has exited.
    ///
    /// # Errors
    ///
    /// Returns an error if the resources could not be released.
    fn release(&self) -> Result<()> {
        Ok(())
    }
}

/// Controllers in the order they are enabled.
const CONTROLLERS: [&str; 4] = ["cpu", "io", "memory", "pids"];

/// Handle to a cgroup for a specific container.
#[derive(Debug, Clone)]
pub struct CgroupManager {
    /// Mount point of the unified hierarchy.
    root: PathBuf,
    /// Path to this container's cgroup directory.
    path: PathBuf,
    config: CgroupConfig,
}

impl CgroupManager {
    /// Creates a manager for the cgroup described by `config`.
    ///
    /// The cgroup lives at `<root>/<parent>/<name>`; `root` is normally
    /// `/sys/fs/cgroup`.
    #[must_use]
    pub fn new(root: &Path, config: &CgroupConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            path: root.join(&config.parent).join(&config.name),
            config: config.clone(),
        }
    }

    /// Controllers the configured limits write to.
    #[must_use]
    pub fn required_controllers(&self) -> Vec<&'static str> {
        let config = &self.config;
        CONTROLLERS
            .into_iter()
            .filter(|controller| match *controller {
                "cpu" => config.cpu_shares.is_some() || config.cpu_quota.is_some(),
                "io" => config.io_weight.is_some(),
                "memory" => config.memory.is_some() || config.memory_high.is_some(),
                "pids" => config.pids_max.is_some(),
                _ => false,
            })
            .collect()
    }

    /// Returns the cgroup directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the cgroup directory and its parents, enabling the required
    /// controllers in the root and in every parent cgroup on the way.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created or a controller
    /// list cannot be read or written.
    pub fn create(&self) -> Result<()> {
        let required = self.required_controllers();
        let mut dir = self.root.clone();
        enable_controllers(&dir, &required)?;
        for component in Path::new(&self.config.parent).components() {
            dir.push(component);
            create_dir(&dir)?;
            enable_controllers(&dir, &required)?;
        }
        create_dir(&self.path)?;
        tracing::info!(path = %self.path.display(), controllers = ?required, "cgroup created");
        Ok(())
    }

    /// Writes the configured limits to this cgroup.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to cgroup control files fails.
    pub fn apply_limits(&self) -> Result<()> {
        let config = &self.config;
        if let Some(bytes) = config.memory {
            memory::set_memory_max(&self.path, bytes)?;
        }
        if let Some(bytes) = config.memory_high {
            memory::set_memory_high(&self.path, bytes)?;
        }
        if let Some(weight) = config.cpu_shares {
            cpu::set_cpu_weight(&self.path, weight)?;
        }
        if let Some(quota_us) = config.cpu_quota {
            let period_us = config.cpu_period.unwrap_or(cpu::DEFAULT_CPU_PERIOD_US);
            cpu::set_cpu_max(&self.path, quota_us, period_us)?;
        }
        if let Some(weight) = config.io_weight {
            io::set_io_weight(&self.path, weight)?;
        }
        if let Some(max) = config.pids_max {
            pids::set_pids_max(&self.path, max)?;
        }
        Ok(())
    }

    /// Adds a process to this cgroup by writing its PID.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to `cgroup.procs` fails.
    pub fn add_process(&self, pid: u32) -> Result<()> {
        write_control(&self.path, "cgroup.procs", &pid.to_string())?;
        tracing::debug!(pid, "added process to cgroup");
        Ok(())
    }

    /// Removes the cgroup directory.
    ///
    /// The kernel only allows this once the cgroup holds no tasks.
    ///
    /// # Errors
    ///
    /// Returns an error if the cgroup directory cannot be removed.
    pub fn destroy(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_dir(&self.path).map_err(|e| NsinitError::Io {
                path: self.path.clone(),
                source: e,
            })?;
        }
        tracing::info!(path = %self.path.display(), "cgroup destroyed");
        Ok(())
    }
}

impl ResourceLimiter for CgroupManager {
    fn apply(&self, pid: u32) -> Result<()> {
        self.create()?;
        self.apply_limits()?;
        self.add_process(pid)
    }

    fn release(&self) -> Result<()> {
        self.destroy()
    }
}

fn create_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| NsinitError::Io {
        path: dir.to_path_buf(),
        source: e,
    })
}

/// Enables the `required` controllers that `dir` offers for its children.
///
/// Controllers missing from `cgroup.controllers` are skipped; the limit
/// write for them then fails with the file's own error.
fn enable_controllers(dir: &Path, required: &[&str]) -> Result<()> {
    if required.is_empty() {
        return Ok(());
    }
    let available_path = dir.join("cgroup.controllers");
    let available = std::fs::read_to_string(&available_path).map_err(|e| NsinitError::Io {
        path: available_path,
        source: e,
    })?;
    let offered: Vec<&str> = available.split_whitespace().collect();
    let (enable, missing): (Vec<&str>, Vec<&str>) =
        required.iter().copied().partition(|controller| offered.contains(controller));
    if !missing.is_empty() {
        tracing::warn!(dir = %dir.display(), missing = ?missing, "cgroup controllers not available");
    }
    if enable.is_empty() {
        return Ok(());
    }
    let value = enable
        .iter()
        .map(|controller| format!("+{controller}"))
        .collect::<Vec<_>>()
        .join(" ");
    write_control(dir, "cgroup.subtree_control", &value)?;
    tracing::debug!(dir = %dir.display(), controllers = %value, "cgroup controllers enabled");
    Ok(())
}

/// Writes `value` to the control file `name` inside `cgroup_path`.
pub(crate) fn write_control(cgroup_path: &Path, name: &str, value: &str) -> Result<()> {
    let file = cgroup_path.join(name);
    std::fs::write(&file, value).map_err(|e| NsinitError::Io {
        path: file,
        source: e,
    })
}
