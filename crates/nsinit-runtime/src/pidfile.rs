//! The pid marker file.
//!
//! Written once after the child starts and removed when the guard drops,
//! on every exit path of the launch.

use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use nsinit_common::constants::{PID_FILE_MODE, PID_FILE_NAME};
use nsinit_common::error::{NsinitError, Result};

/// Guard owning the pid marker file.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Writes `pid` as decimal text to `.nspid` inside `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn create(dir: &Path, pid: u32) -> Result<Self> {
        let path = dir.join(PID_FILE_NAME);
        let io_err = |source: std::io::Error| NsinitError::Io {
            path: path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(PID_FILE_MODE)
            .open(&path)
            .map_err(io_err)?;
        file.write_all(pid.to_string().as_bytes()).map_err(io_err)?;
        tracing::debug!(path = %path.display(), pid, "pid file written");
        Ok(Self { path })
    }

    /// Location of the marker.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the pid recorded in `dir`, if a marker exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker exists but cannot be read or parsed.
    #[cfg(test)]
    pub(crate) fn read(dir: &Path) -> Result<Option<u32>> {
        let path = dir.join(PID_FILE_NAME);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(NsinitError::Io { path, source: e }),
        };
        content
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| NsinitError::Config {
                message: format!("{} does not hold a pid: {content:?}", path.display()),
            })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "pid file removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove pid file");
            }
        }
    }
}
