//! Byte relay between the host terminal and the container console.
//!
//! Two copy tasks run on their own threads: console output to the host and
//! host input to the console. The host terminal is put in raw mode for the
//! lifetime of the relay and restored exactly once, when the relay is
//! finished or dropped.

use std::fs::File;
use std::io::{self, ErrorKind, Read, Write};
use std::os::fd::AsFd;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use nsinit_common::constants::RELAY_BUFFER_SIZE;
use nsinit_common::error::{NsinitError, Result};
use nsinit_core::terminal::{HostTerminal, set_window_size};

/// How a copy task ended.
#[derive(Debug)]
pub enum TaskOutcome {
    /// The source reached end of stream.
    Finished {
        /// Bytes copied.
        bytes: u64,
    },
    /// Copying failed.
    Failed(io::Error),
    /// Still blocked when the relay finished; the thread was left running.
    Detached,
}

impl TaskOutcome {
    /// Whether the task ran to end of stream.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        matches!(self, Self::Finished { .. })
    }
}

/// Outcome of both copy tasks.
#[derive(Debug)]
pub struct RelayReport {
    /// Console to host terminal.
    pub output: TaskOutcome,
    /// Host terminal to console.
    pub input: TaskOutcome,
}

struct Task {
    handle: JoinHandle<io::Result<u64>>,
    done: Receiver<()>,
}

impl Task {
    fn spawn(name: &str, from: Box<dyn Read + Send>, to: Box<dyn Write + Send>) -> Result<Self> {
        let (tx, done) = mpsc::channel();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let result = pump(from, to);
                let _ = tx.send(());
                result
            })
            .map_err(|e| NsinitError::syscall("spawn relay task", e))?;
        Ok(Self { handle, done })
    }

    /// Waits up to `timeout` for the task; a zero timeout only polls.
    fn settle(self, timeout: Duration) -> TaskOutcome {
        let ended = if timeout.is_zero() {
            !matches!(self.done.try_recv(), Err(TryRecvError::Empty))
        } else {
            !matches!(self.done.recv_timeout(timeout), Err(RecvTimeoutError::Timeout))
        };
        if !ended {
            return TaskOutcome::Detached;
        }
        match self.handle.join() {
            Ok(Ok(bytes)) => TaskOutcome::Finished { bytes },
            Ok(Err(e)) => TaskOutcome::Failed(e),
            Err(_) => TaskOutcome::Failed(io::Error::other("relay task panicked")),
        }
    }
}

/// Copies `from` into `to` until end of stream, flushing every chunk.
///
/// `EIO` is end of stream: a pty master reports it once every slave
/// descriptor is closed.
fn pump(mut from: impl Read, mut to: impl Write) -> io::Result<u64> {
    let mut buf = [0u8; RELAY_BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let n = match from.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if e.raw_os_error() == Some(libc::EIO) => return Ok(total),
            Err(e) => return Err(e),
        };
        to.write_all(&buf[..n])?;
        to.flush()?;
        total += n as u64;
    }
}

/// A running relay.
pub struct Relay<'t, T: HostTerminal> {
    terminal: &'t T,
    state: Option<T::State>,
    output: Option<Task>,
    input: Option<Task>,
}

impl<'t, T: HostTerminal> Relay<'t, T> {
    /// Copies the host window size to `master`, switches the host terminal
    /// to raw mode and starts both copy tasks.
    ///
    /// # Errors
    ///
    /// Returns an error if the window size cannot be propagated, the
    /// terminal cannot be switched, or a task cannot be started. The host
    /// terminal is left in its original mode.
    pub fn attach(terminal: &'t T, master: File) -> Result<Self> {
        let size = terminal.window_size()?;
        set_window_size(master.as_fd(), &size)?;
        let master_in = master
            .try_clone()
            .map_err(|e| NsinitError::syscall("dup console", e))?;
        let host_in = terminal.input()?;
        let host_out = terminal.output()?;

        let mut relay = Self {
            terminal,
            state: Some(terminal.make_raw()?),
            output: None,
            input: None,
        };
        relay.output = Some(Task::spawn("relay-output", Box::new(master), host_out)?);
        relay.input = Some(Task::spawn("relay-input", host_in, Box::new(master_in))?);
        tracing::debug!(rows = size.ws_row, cols = size.ws_col, "terminal relay attached");
        Ok(relay)
    }

    /// Stops the relay once the child has exited.
    ///
    /// Console output gets up to `drain` to reach end of stream. Host input
    /// is not waited for; a task still blocked on it is reported as
    /// [`TaskOutcome::Detached`].
    pub fn finish(mut self, drain: Duration) -> RelayReport {
        let output = self
            .output
            .take()
            .map_or(TaskOutcome::Detached, |task| task.settle(drain));
        let input = self
            .input
            .take()
            .map_or(TaskOutcome::Detached, |task| task.settle(Duration::ZERO));
        self.restore();
        tracing::debug!(output = ?output, input = ?input, "terminal relay finished");
        RelayReport { output, input }
    }

    fn restore(&mut self) {
        if let Some(state) = self.state.take() {
            if let Err(e) = self.terminal.restore(state) {
                tracing::warn!(error = %e, "failed to restore host terminal");
            }
        }
    }
}

impl<T: HostTerminal> Drop for Relay<'_, T> {
    fn drop(&mut self) {
        self.restore();
    }
}
