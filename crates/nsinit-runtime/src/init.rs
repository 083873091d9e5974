//! The child side of the launch: the `init` role.
//!
//! Runs inside the new namespaces. Blocks on the control channel until the
//! host closes it, brings up networking if an interface name arrived, makes
//! the console its controlling terminal and execs the requested program.

use std::convert::Infallible;
use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::Read;
use std::os::fd::{AsFd, AsRawFd};
use std::path::{Path, PathBuf};

use nix::unistd::{dup2_stderr, dup2_stdin, dup2_stdout, execvp, setsid};
use nsinit_common::error::{NsinitError, Result};
use nsinit_core::network::NetworkPrimitives;

mod ioctl {
    nix::ioctl_write_int_bad!(set_controlling_terminal, libc::TIOCSCTTY);
}

/// Loopback interface inside the new network namespace.
const LOOPBACK: &str = "lo";

/// Reads the control channel to end of data.
///
/// Returns the interface name the host sent, or `None` if the channel was
/// closed without a payload.
///
/// # Errors
///
/// Returns an error if the channel cannot be read or is not UTF-8.
pub fn receive_handshake(mut reader: impl Read) -> Result<Option<String>> {
    let mut payload = String::new();
    let _ = reader
        .read_to_string(&mut payload)
        .map_err(|e| NsinitError::syscall("read control channel", e))?;
    let name = payload.trim();
    Ok((!name.is_empty()).then(|| name.to_string()))
}

/// Brings up loopback and the interface handed over by the host.
///
/// # Errors
///
/// Returns the first failing primitive's error.
pub fn configure_network(net: &dyn NetworkPrimitives, interface: &str) -> Result<()> {
    net.set_up(LOOPBACK)?;
    net.set_up(interface)?;
    tracing::debug!(interface, "container network up");
    Ok(())
}

/// Starts a new session and makes `console` its controlling terminal on
/// standard input, output and error.
///
/// # Errors
///
/// Returns an error if any of the calls fail.
pub fn attach_console(console: &Path) -> Result<()> {
    let _ = setsid().map_err(|e| NsinitError::syscall("setsid", e))?;
    let tty: File = OpenOptions::new()
        .read(true)
        .write(true)
        .open(console)
        .map_err(|e| NsinitError::Io {
            path: console.to_path_buf(),
            source: e,
        })?;
    // SAFETY: `tty` is an open terminal descriptor for the duration of the call.
    let _ = unsafe { ioctl::set_controlling_terminal(tty.as_raw_fd(), 0) }
        .map_err(|e| NsinitError::syscall("TIOCSCTTY", e))?;
    dup2_stdin(tty.as_fd()).map_err(|e| NsinitError::syscall("dup2", e))?;
    dup2_stdout(tty.as_fd()).map_err(|e| NsinitError::syscall("dup2", e))?;
    dup2_stderr(tty.as_fd()).map_err(|e| NsinitError::syscall("dup2", e))?;
    Ok(())
}

/// Converts `args` for `execvp`.
fn exec_args(args: &[String]) -> Result<Vec<CString>> {
    if args.is_empty() {
        return Err(NsinitError::Config {
            message: "no command given to init".into(),
        });
    }
    args.iter()
        .map(|arg| {
            CString::new(arg.as_bytes()).map_err(|_| NsinitError::Config {
                message: format!("argument contains NUL byte: {arg:?}"),
            })
        })
        .collect()
}

/// Runs the init role and replaces the process with `args`.
///
/// Only returns on failure.
///
/// # Errors
///
/// Returns an error if the handshake, network setup, console attachment or
/// exec fails.
pub fn run(console: &Path, args: &[String], net: &dyn NetworkPrimitives) -> Result<Infallible> {
    let argv = exec_args(args)?;
    if let Some(interface) = receive_handshake(std::io::stdin().lock())? {
        configure_network(net, &interface)?;
    }
    attach_console(console)?;

    let program = &argv[0];
    tracing::debug!(program = ?program, "exec");
    execvp(program, &argv).map_err(|e| NsinitError::Io {
        path: PathBuf::from(&args[0]),
        source: e.into(),
    })
}
