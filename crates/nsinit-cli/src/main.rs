//! # nsinit
//!
//! Launches a container init inside fresh namespaces, applies cgroup
//! limits, hands it a veth interface and relays the terminal.
//! The same binary serves as the init inside the container.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

mod commands;

use std::ffi::OsString;

use clap::Parser;
use nsinit_common::constants::CONSOLE_FLAG;
use nsinit_runtime::error::LaunchError;

use crate::commands::Cli;

/// Exit code for failures outside the launch sequence.
const FAILURE_EXIT_CODE: i32 = 1;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse_from(normalize_args(std::env::args_os()));
    let code = match commands::execute(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "nsinit failed");
            #[allow(clippy::print_stderr)]
            {
                eprintln!("nsinit: {e:#}");
            }
            e.downcast_ref::<LaunchError>()
                .map_or(FAILURE_EXIT_CODE, LaunchError::exit_code)
        }
    };
    std::process::exit(code);
}

/// Accepts the single-dash console flag of the child invocation as
/// `--console`. Arguments after `--` are left alone.
fn normalize_args(args: impl IntoIterator<Item = OsString>) -> Vec<OsString> {
    let mut passthrough = false;
    args.into_iter()
        .map(|arg| {
            if passthrough {
                return arg;
            }
            if arg == "--" {
                passthrough = true;
                arg
            } else if arg == CONSOLE_FLAG {
                OsString::from("--console")
            } else {
                arg
            }
        })
        .collect()
}
