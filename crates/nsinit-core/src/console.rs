//! Pseudo-terminal allocation for the container console.
//!
//! The master stays in the host process for relaying; the slave path is
//! handed to the child, which opens it as its controlling terminal.

use std::fs::File;
use std::os::fd::{FromRawFd, IntoRawFd};
use std::path::{Path, PathBuf};

use nix::fcntl::OFlag;
use nix::pty::{grantpt, posix_openpt, ptsname_r, unlockpt};
use nsinit_common::error::{NsinitError, Result};

/// A master/slave pseudo-terminal pair.
#[derive(Debug)]
pub struct Console {
    master: File,
    slave_path: PathBuf,
}

impl Console {
    /// Opens the pty multiplexer, resolves the slave path and unlocks it.
    ///
    /// The master is opened close-on-exec and without becoming the
    /// controlling terminal of the host process.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the pty calls fail.
    pub fn open() -> Result<Self> {
        let master = posix_openpt(OFlag::O_RDWR | OFlag::O_NOCTTY | OFlag::O_CLOEXEC)
            .map_err(|e| NsinitError::syscall("posix_openpt", e))?;
        grantpt(&master).map_err(|e| NsinitError::syscall("grantpt", e))?;
        unlockpt(&master).map_err(|e| NsinitError::syscall("unlockpt", e))?;
        let slave_path = PathBuf::from(
            ptsname_r(&master).map_err(|e| NsinitError::syscall("ptsname", e))?,
        );
        // SAFETY: the descriptor was just released by `PtyMaster`, so the
        // file becomes its sole owner.
        let master = unsafe { File::from_raw_fd(master.into_raw_fd()) };
        tracing::debug!(slave = %slave_path.display(), "console allocated");
        Ok(Self { master, slave_path })
    }

    /// Path of the slave device, e.g. `/dev/pts/3`.
    #[must_use]
    pub fn slave_path(&self) -> &Path {
        &self.slave_path
    }

    /// Gives up the slave path and keeps the master for relaying.
    #[must_use]
    pub fn into_master(self) -> File {
        self.master
    }
}
