//! CLI command definitions and dispatch.

pub mod exec;
pub mod init;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// nsinit: launch a container init in fresh namespaces.
#[derive(Parser, Debug)]
#[command(name = "nsinit", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Container directory holding the configuration and the pid marker.
    #[arg(long, global = true, default_value = ".")]
    pub dir: PathBuf,

    /// Console device the init attaches to.
    #[arg(long, global = true)]
    pub console: Option<PathBuf>,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Launch a container and wait for it to exit.
    Exec(exec::ExecArgs),
    /// Container side of a launch; invoked by `exec`, not by users.
    #[command(hide = true)]
    Init(init::InitArgs),
}

/// Dispatches the parsed CLI command and returns the process exit code.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<i32> {
    match cli.command {
        Command::Exec(args) => exec::execute(args, &cli.dir),
        Command::Init(args) => init::execute(args, cli.console.as_deref()),
    }
}
