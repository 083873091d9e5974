//! Host terminal control: window size and raw mode.
//!
//! The free functions operate on any terminal descriptor. [`HostTerminal`]
//! is the seam the launch uses, with [`StdTerminal`] wiring it to the
//! process's standard input and output.

use std::io::{Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};

use nix::pty::Winsize;
use nix::sys::termios::{SetArg, Termios, cfmakeraw, tcgetattr, tcsetattr};
use nsinit_common::error::{NsinitError, Result};

mod ioctl {
    nix::ioctl_read_bad!(get_winsize, libc::TIOCGWINSZ, nix::pty::Winsize);
    nix::ioctl_write_ptr_bad!(set_winsize, libc::TIOCSWINSZ, nix::pty::Winsize);
}

/// Terminal attributes captured before switching to raw mode.
#[derive(Clone)]
pub struct TerminalState(Termios);

impl TerminalState {
    /// The captured attributes.
    #[must_use]
    pub const fn termios(&self) -> &Termios {
        &self.0
    }
}

impl std::fmt::Debug for TerminalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalState")
            .field("local_flags", &self.0.local_flags)
            .finish_non_exhaustive()
    }
}

/// Reads the window size of the terminal on `fd`.
///
/// # Errors
///
/// Returns an error if `fd` is not a terminal.
pub fn window_size(fd: BorrowedFd<'_>) -> Result<Winsize> {
    let mut size = Winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    // SAFETY: `fd` is a live descriptor and `size` is a valid out-pointer.
    unsafe { ioctl::get_winsize(fd.as_raw_fd(), &raw mut size) }
        .map_err(|e| NsinitError::syscall("TIOCGWINSZ", e))?;
    Ok(size)
}

/// Sets the window size of the terminal on `fd`.
///
/// # Errors
///
/// Returns an error if `fd` is not a terminal.
pub fn set_window_size(fd: BorrowedFd<'_>, size: &Winsize) -> Result<()> {
    // SAFETY: `fd` is a live descriptor and `size` points to a valid winsize.
    unsafe { ioctl::set_winsize(fd.as_raw_fd(), std::ptr::from_ref(size)) }
        .map_err(|e| NsinitError::syscall("TIOCSWINSZ", e))?;
    Ok(())
}

/// Switches the terminal on `fd` to raw mode, returning the prior state.
///
/// # Errors
///
/// Returns an error if the attributes cannot be read or written.
pub fn make_raw(fd: BorrowedFd<'_>) -> Result<TerminalState> {
    let original = tcgetattr(fd).map_err(|e| NsinitError::syscall("tcgetattr", e))?;
    let mut raw = original.clone();
    cfmakeraw(&mut raw);
    tcsetattr(fd, SetArg::TCSANOW, &raw).map_err(|e| NsinitError::syscall("tcsetattr", e))?;
    tracing::debug!("terminal switched to raw mode");
    Ok(TerminalState(original))
}

/// Restores attributes captured by [`make_raw`].
///
/// # Errors
///
/// Returns an error if the attributes cannot be written.
pub fn restore(fd: BorrowedFd<'_>, state: &TerminalState) -> Result<()> {
    tcsetattr(fd, SetArg::TCSANOW, &state.0).map_err(|e| NsinitError::syscall("tcsetattr", e))?;
    tracing::debug!("terminal restored");
    Ok(())
}

/// The host side of the terminal relay.
pub trait HostTerminal {
    /// Snapshot returned by [`HostTerminal::make_raw`].
    type State;

    /// Current window size of the host terminal.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be read.
    fn window_size(&self) -> Result<Winsize>;

    /// Switches the host terminal to raw mode, returning the prior state.
    ///
    /// # Errors
    ///
    /// Returns an error if the mode cannot be changed.
    fn make_raw(&self) -> Result<Self::State>;

    /// Restores the state captured by [`HostTerminal::make_raw`].
    ///
    /// # Errors
    ///
    /// Returns an error if the mode cannot be changed.
    fn restore(&self, state: Self::State) -> Result<()>;

    /// Stream relayed into the console.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be opened.
    fn input(&self) -> Result<Box<dyn Read + Send>>;

    /// Stream receiving console output.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be opened.
    fn output(&self) -> Result<Box<dyn Write + Send>>;
}

/// The process's standard input and output.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdTerminal;

impl HostTerminal for StdTerminal {
    type State = TerminalState;

    fn window_size(&self) -> Result<Winsize> {
        window_size(std::io::stdin().as_fd())
    }

    fn make_raw(&self) -> Result<TerminalState> {
        make_raw(std::io::stdin().as_fd())
    }

    fn restore(&self, state: TerminalState) -> Result<()> {
        restore(std::io::stdin().as_fd(), &state)
    }

    fn input(&self) -> Result<Box<dyn Read + Send>> {
        Ok(Box::new(std::io::stdin()))
    }

    fn output(&self) -> Result<Box<dyn Write + Send>> {
        Ok(Box::new(std::io::stdout()))
    }
}

#[cfg(test)]
mod tests {
    use std::os::fd::AsFd;

    use nix::pty::openpty;
    use nix::sys::termios::LocalFlags;

    use super::*;

    fn same_attributes(a: &Termios, b: &Termios) -> bool {
        a.input_flags == b.input_flags
            && a.output_flags == b.output_flags
            && a.control_flags == b.control_flags
            && a.local_flags == b.local_flags
            && a.control_chars == b.control_chars
    }

    #[test]
    fn raw_mode_round_trips_attributes() {
        let pty = openpty(None, None).expect("openpty");
        let fd = pty.slave.as_fd();
        let before = tcgetattr(fd).expect("tcgetattr");

        let state = make_raw(fd).expect("make raw");
        let raw = tcgetattr(fd).expect("tcgetattr raw");
        assert!(!raw.local_flags.contains(LocalFlags::ICANON));
        assert!(!raw.local_flags.contains(LocalFlags::ECHO));
        assert!(same_attributes(state.termios(), &before));

        restore(fd, &state).expect("restore");
        let after = tcgetattr(fd).expect("tcgetattr after");
        assert!(same_attributes(&after, &before));
    }

    #[test]
    fn window_size_propagates_between_terminals() {
        let host = openpty(None, None).expect("host pty");
        let console = openpty(None, None).expect("console pty");
        let size = Winsize {
            ws_row: 42,
            ws_col: 132,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        set_window_size(host.slave.as_fd(), &size).expect("set host size");

        let read = window_size(host.slave.as_fd()).expect("read host size");
        set_window_size(console.master.as_fd(), &read).expect("propagate");

        let seen = window_size(console.slave.as_fd()).expect("read console size");
        assert_eq!((seen.ws_row, seen.ws_col), (42, 132));
    }

    #[test]
    fn window_size_of_non_terminal_fails() {
        let file = tempfile::tempfile().expect("tempfile");
        let err = window_size(file.as_fd()).unwrap_err();
        assert!(matches!(err, NsinitError::Syscall { op: "TIOCGWINSZ", .. }));
    }
}
