//! `nsinit exec`: Launch a container and wait for it to exit.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use nsinit_common::config::ContainerConfig;
use nsinit_common::constants::{CGROUP_V2_PATH, CONFIG_FILE_NAME};
use nsinit_core::cgroup::CgroupManager;
use nsinit_core::network::IpRoute;
use nsinit_core::terminal::StdTerminal;
use nsinit_runtime::exec::Exec;
use nsinit_runtime::process::Launcher;

/// Arguments for the `exec` command.
#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Configuration file; defaults to `container.json` in the container
    /// directory, if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Root of the cgroup v2 hierarchy.
    #[arg(long, default_value = CGROUP_V2_PATH)]
    pub cgroup_root: PathBuf,

    /// Command to run as the container's init.
    #[arg(trailing_var_arg = true, required = true)]
    pub args: Vec<String>,
}

/// Resolves the configuration for a launch in `dir`.
fn load_config(explicit: Option<&Path>, dir: &Path) -> anyhow::Result<ContainerConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let default = dir.join(CONFIG_FILE_NAME);
            if !default.exists() {
                tracing::debug!(dir = %dir.display(), "no configuration file, using defaults");
                return Ok(ContainerConfig::default());
            }
            default
        }
    };
    ContainerConfig::load(&path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))
}

/// Executes the `exec` command and returns the child's exit code.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or the launch
/// fails.
pub fn execute(args: ExecArgs, dir: &Path) -> anyhow::Result<i32> {
    let dir = std::fs::canonicalize(dir)
        .with_context(|| format!("container directory {} not found", dir.display()))?;
    let config = load_config(args.config.as_deref(), &dir)?;

    let limiter = config
        .cgroups
        .as_ref()
        .map(|cgroups| CgroupManager::new(&args.cgroup_root, cgroups));
    let network = match config.network {
        Some(_) => Some(IpRoute::locate()?),
        None => None,
    };
    let launcher = Launcher::current_exe(&dir)?;
    let terminal = StdTerminal;

    let mut exec = Exec::new(&config, &launcher, &terminal);
    if let Some(limiter) = &limiter {
        exec = exec.with_limiter(limiter);
    }
    if let Some(network) = &network {
        exec = exec.with_network(network);
    }

    tracing::info!(dir = %dir.display(), command = ?args.args, "launching container");
    Ok(exec.run(&args.args)?)
}
