//! `nsinit init`: Container side of a launch.

use std::path::Path;

use anyhow::Context;
use clap::Args;
use nsinit_core::network::IpRoute;

/// Arguments for the `init` command.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Command to exec once the host has configured the container.
    #[arg(trailing_var_arg = true, required = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

/// Waits for the host's handshake on standard input, then execs the command
/// with `console` as its terminal. Only returns on failure.
///
/// # Errors
///
/// Returns an error if `--console` is missing or any init step fails.
pub fn execute(args: InitArgs, console: Option<&Path>) -> anyhow::Result<i32> {
    let console = console.context("init requires --console")?;
    let net = IpRoute::default();
    match nsinit_runtime::init::run(console, &args.args, &net)? {}
}
