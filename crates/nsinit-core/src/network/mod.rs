//! Network interface primitives.
//!
//! The launch only sequences calls to these primitives; creating links,
//! moving them between namespaces and toggling their state is left to the
//! implementation behind [`NetworkPrimitives`].

pub mod ip;
pub mod veth;

use nsinit_common::error::Result;

pub use ip::IpRoute;
pub use veth::{create_veth_pair, generate_name};

/// Kernel operations on network interfaces.
pub trait NetworkPrimitives {
    /// Creates a veth pair named `host` and `peer`.
    ///
    /// # Errors
    ///
    /// Returns [`nsinit_common::error::NsinitError::InterfaceExists`] when
    /// either name is taken, or another error if creation fails.
    fn create_veth_pair(&self, host: &str, peer: &str) -> Result<()>;

    /// Attaches `iface` to `bridge` as its master.
    ///
    /// # Errors
    ///
    /// Returns an error if the interface or bridge is missing.
    fn set_master(&self, iface: &str, bridge: &str) -> Result<()>;

    /// Detaches `iface` from its master.
    ///
    /// # Errors
    ///
    /// Returns an error if the interface is missing.
    fn clear_master(&self, iface: &str) -> Result<()>;

    /// Sets the administrative state of `iface` to up.
    ///
    /// # Errors
    ///
    /// Returns an error if the interface is missing.
    fn set_up(&self, iface: &str) -> Result<()>;

    /// Sets the administrative state of `iface` to down.
    ///
    /// # Errors
    ///
    /// Returns an error if the interface is missing.
    fn set_down(&self, iface: &str) -> Result<()>;

    /// Moves `iface` into the network namespace of process `pid`.
    ///
    /// # Errors
    ///
    /// Returns an error if the interface or process is missing.
    fn move_to_namespace(&self, iface: &str, pid: u32) -> Result<()>;

    /// Deletes `iface`; deleting either end of a veth pair removes both.
    ///
    /// # Errors
    ///
    /// Returns an error if the interface is missing.
    fn delete(&self, iface: &str) -> Result<()>;
}
