//! Unified error type for the nsinit workspace.
//!
//! The runtime crate wraps these variants in its own `LaunchError` to
//! record which launch step failed.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum NsinitError {
    /// An I/O operation on a file failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A kernel call failed.
    #[error("{op} failed: {source}")]
    Syscall {
        /// Name of the failing operation.
        op: &'static str,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// A network primitive reported a failure.
    #[error("network operation {op} on {interface} failed: {message}")]
    Network {
        /// Name of the failing operation.
        op: &'static str,
        /// Interface the operation targeted.
        interface: String,
        /// Diagnostic reported by the primitive.
        message: String,
    },

    /// An interface with the requested name already exists.
    #[error("interface {name} already exists")]
    InterfaceExists {
        /// The colliding interface name.
        name: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl NsinitError {
    /// Builds a [`NsinitError::Syscall`] from anything convertible to an OS error,
    /// such as a `nix` errno.
    pub fn syscall(op: &'static str, source: impl Into<std::io::Error>) -> Self {
        Self::Syscall {
            op,
            source: source.into(),
        }
    }

    /// Returns `true` when the error reports an interface name collision.
    #[must_use]
    pub const fn is_interface_exists(&self) -> bool {
        matches!(self, Self::InterfaceExists { .. })
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, NsinitError>;
