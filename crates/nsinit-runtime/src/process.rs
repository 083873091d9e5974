//! Process spawning inside isolated namespaces.
//!
//! The child is created with `clone(2)` directly inside the configured
//! namespaces and immediately re-executes the launcher binary in its init
//! role. Its standard input is the read end of the control channel, so the
//! init blocks until the host has finished configuring it and closes the
//! channel.

use std::ffi::{CString, c_char};
use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sched::clone;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{Pid, pipe2};
use nsinit_common::config::NamespaceConfig;
use nsinit_common::constants::{CONSOLE_FLAG, INIT_ROLE};
use nsinit_common::error::NsinitError;
use nsinit_core::namespace::clone_flags;

use crate::error::{LaunchError, LaunchStep, Result, StepExt};
use crate::pidfile::PidFile;

/// Stack handed to `clone(2)`; the child only runs until `execv`.
const CHILD_STACK_SIZE: usize = 128 * 1024;

/// Exit status of a child whose setup or exec failed.
const EXEC_FAILED: i32 = 127;

/// Write end of the host-to-child control channel.
///
/// Consuming methods make the channel close exactly once, after any
/// payload has been written.
#[derive(Debug)]
pub struct ControlChannel {
    writer: File,
}

impl From<OwnedFd> for ControlChannel {
    fn from(fd: OwnedFd) -> Self {
        Self {
            writer: File::from(fd),
        }
    }
}

impl ControlChannel {
    /// Writes `payload` as raw text, then closes the channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails, for example because the child
    /// has already exited.
    pub fn send(mut self, payload: &str) -> nsinit_common::error::Result<()> {
        self.writer
            .write_all(payload.as_bytes())
            .and_then(|()| self.writer.flush())
            .map_err(|e| NsinitError::syscall("write control channel", e))?;
        tracing::debug!(bytes = payload.len(), "control payload sent");
        self.close();
        Ok(())
    }

    /// Closes the channel without a payload.
    pub fn close(self) {
        drop(self.writer);
        tracing::debug!("control channel closed");
    }
}

/// The running child.
///
/// Dropping a process that was never reaped kills it.
#[derive(Debug)]
pub struct LaunchedProcess {
    pid: Pid,
    control: Option<ControlChannel>,
    reaped: bool,
}

impl LaunchedProcess {
    /// Host pid of the child.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub const fn pid(&self) -> u32 {
        self.pid.as_raw() as u32
    }

    /// Takes the control channel; it can be taken only once.
    pub fn take_control(&mut self) -> Option<ControlChannel> {
        self.control.take()
    }

    /// Blocks until the child terminates and returns its raw wait status.
    ///
    /// # Errors
    ///
    /// Returns an error if `waitpid(2)` fails, e.g. the child was already
    /// reaped elsewhere.
    pub fn wait_status(&mut self) -> nsinit_common::error::Result<WaitStatus> {
        loop {
            match waitpid(self.pid, None) {
                Ok(status @ (WaitStatus::Exited(..) | WaitStatus::Signaled(..))) => {
                    self.reaped = true;
                    return Ok(status);
                }
                Ok(_) | Err(Errno::EINTR) => {}
                Err(e) => {
                    if e == Errno::ECHILD {
                        self.reaped = true;
                    }
                    return Err(NsinitError::syscall("waitpid", e));
                }
            }
        }
    }

    /// Kills the child and reaps it. Failures are logged, not returned.
    pub fn kill(&mut self) {
        if self.reaped {
            return;
        }
        match kill(self.pid, Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => tracing::warn!(pid = %self.pid, error = %e, "failed to kill child"),
        }
        drop(self.control.take());
        match self.wait_status() {
            Ok(status) => tracing::info!(pid = %self.pid, status = ?status, "child killed"),
            Err(e) => tracing::warn!(pid = %self.pid, error = %e, "failed to reap killed child"),
        }
    }
}

impl Drop for LaunchedProcess {
    fn drop(&mut self) {
        if !self.reaped {
            tracing::warn!(pid = %self.pid, "dropping unreaped child");
            self.kill();
        }
    }
}

/// Everything the cloned child needs, prepared before `clone(2)` so the
/// child does not allocate.
struct ChildSetup {
    program: CString,
    argv: Vec<*const c_char>,
    dir: CString,
    stdin: RawFd,
    null: RawFd,
    error_pipe: RawFd,
}

/// Runs in the cloned child: wires stdio, enters the container directory
/// and execs the init. Never returns on success.
///
/// # Safety
///
/// Must only be called in a freshly cloned child. All pointers in `setup`
/// must be valid, and `argv` must be NULL-terminated.
unsafe fn exec_child(setup: &ChildSetup) -> isize {
    // SAFETY: descriptors and strings are valid per the caller's contract;
    // only async-signal-safe calls are made.
    unsafe {
        // The host ignores SIGPIPE; the init expects the default disposition.
        let _ = libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        if libc::dup2(setup.stdin, libc::STDIN_FILENO) >= 0
            && libc::dup2(setup.null, libc::STDOUT_FILENO) >= 0
            && libc::dup2(setup.null, libc::STDERR_FILENO) >= 0
            && libc::chdir(setup.dir.as_ptr()) == 0
        {
            let _ = libc::execv(setup.program.as_ptr(), setup.argv.as_ptr());
        }
        let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
        let bytes = errno.to_ne_bytes();
        let _ = libc::write(setup.error_pipe, bytes.as_ptr().cast(), bytes.len());
        libc::_exit(EXEC_FAILED)
    }
}

/// Starts the init process for a container.
#[derive(Debug, Clone)]
pub struct Launcher {
    program: PathBuf,
    work_dir: PathBuf,
}

impl Launcher {
    /// Launches `program` in the init role, inside `work_dir`.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            work_dir: work_dir.into(),
        }
    }

    /// Launches the running executable in the init role.
    ///
    /// # Errors
    ///
    /// Returns an error if the running executable cannot be determined.
    pub fn current_exe(work_dir: impl Into<PathBuf>) -> nsinit_common::error::Result<Self> {
        let program = std::env::current_exe().map_err(|e| NsinitError::Io {
            path: PathBuf::from("/proc/self/exe"),
            source: e,
        })?;
        Ok(Self::new(program, work_dir))
    }

    /// Argument vector of the child: `<program> -console <slave> init -- <args>`.
    #[must_use]
    pub fn command_line(&self, console: &Path, args: &[String]) -> Vec<String> {
        let mut argv = vec![
            self.program.to_string_lossy().into_owned(),
            CONSOLE_FLAG.to_string(),
            console.to_string_lossy().into_owned(),
            INIT_ROLE.to_string(),
            "--".to_string(),
        ];
        argv.extend(args.iter().cloned());
        argv
    }

    /// Creates the child in the requested namespaces and records its pid.
    ///
    /// The returned process holds the control channel; the child blocks on
    /// it until the channel is closed.
    ///
    /// # Errors
    ///
    /// Returns a [`LaunchStep::Pipe`] or [`LaunchStep::Start`] error if the
    /// child could not be created or failed to exec, and a
    /// [`LaunchStep::PidFile`] error, after killing the child, if the
    /// marker could not be written.
    pub fn launch(
        &self,
        namespaces: &NamespaceConfig,
        console: &Path,
        args: &[String],
    ) -> Result<(LaunchedProcess, PidFile)> {
        let argv = self
            .command_line(console, args)
            .into_iter()
            .map(CString::new)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| start_error(format!("argument contains NUL byte: {e}")))?;
        let program = cstring(self.program.as_os_str().as_bytes())?;
        let dir = cstring(self.work_dir.as_os_str().as_bytes())?;

        let (control_read, control_write) = pipe2(OFlag::O_CLOEXEC)
            .map_err(|e| NsinitError::syscall("pipe", e))
            .step(LaunchStep::Pipe)?;
        let (error_read, error_write) = pipe2(OFlag::O_CLOEXEC)
            .map_err(|e| NsinitError::syscall("pipe", e))
            .step(LaunchStep::Pipe)?;
        let null = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open("/dev/null")
            .map_err(|e| NsinitError::Io {
                path: PathBuf::from("/dev/null"),
                source: e,
            })
            .step(LaunchStep::Pipe)?;

        let mut argv_ptrs: Vec<*const c_char> = argv.iter().map(|a| a.as_ptr()).collect();
        argv_ptrs.push(std::ptr::null());
        let setup = ChildSetup {
            program,
            argv: argv_ptrs,
            dir,
            stdin: control_read.as_raw_fd(),
            null: null.as_raw_fd(),
            error_pipe: error_write.as_raw_fd(),
        };

        let flags = clone_flags(namespaces);
        let mut stack = vec![0u8; CHILD_STACK_SIZE];
        // SAFETY: the callback only performs async-signal-safe calls on data
        // prepared above, which outlives the call.
        let pid = unsafe {
            clone(
                Box::new(|| exec_child(&setup)),
                &mut stack,
                flags,
                Some(Signal::SIGCHLD as i32),
            )
        }
        .map_err(|e| NsinitError::syscall("clone", e))
        .step(LaunchStep::Start)?;

        drop(control_read);
        drop(error_write);
        drop(null);
        drop(setup);
        drop(argv);

        let mut process = LaunchedProcess {
            pid,
            control: Some(ControlChannel::from(control_write)),
            reaped: false,
        };

        if let Some(errno) = exec_errno(error_read) {
            process.kill();
            return Err(LaunchError::setup(
                LaunchStep::Start,
                NsinitError::syscall("exec init", std::io::Error::from_raw_os_error(errno)),
            ));
        }
        tracing::info!(pid = process.pid(), flags = ?flags, "child started");

        match PidFile::create(&self.work_dir, process.pid()) {
            Ok(pid_file) => Ok((process, pid_file)),
            Err(e) => {
                process.kill();
                Err(LaunchError::setup(LaunchStep::PidFile, e))
            }
        }
    }
}

/// Reads the exec error pipe. End-of-data without a payload means the exec
/// succeeded and the close-on-exec descriptor was closed.
fn exec_errno(error_read: OwnedFd) -> Option<i32> {
    let mut buf = Vec::with_capacity(4);
    if let Err(e) = File::from(error_read).read_to_end(&mut buf) {
        tracing::warn!(error = %e, "failed to read exec status");
    }
    let bytes: [u8; 4] = buf.get(..4)?.try_into().ok()?;
    Some(i32::from_ne_bytes(bytes))
}

fn cstring(bytes: &[u8]) -> Result<CString> {
    CString::new(bytes).map_err(|e| start_error(format!("path contains NUL byte: {e}")))
}

fn start_error(message: String) -> LaunchError {
    LaunchError::setup(LaunchStep::Start, NsinitError::Config { message })
}
