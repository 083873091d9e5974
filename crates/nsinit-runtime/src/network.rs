//! Network bootstrap for the child's namespace.
//!
//! Creates a veth pair, attaches the host end to the bridge and brings it
//! up, moves the peer into the child's network namespace and hands the
//! peer's name to the child over the control channel.
//!
//! Every kernel resource created here registers a release action. If a
//! later step fails the actions run in reverse order.

use nsinit_common::config::NetworkConfig;
use nsinit_common::constants::VETH_CREATE_ATTEMPTS;
use nsinit_common::types::VethPair;
use nsinit_core::network::{NetworkPrimitives, create_veth_pair};

use crate::error::{LaunchStep, Result, StepExt};
use crate::process::ControlChannel;

/// Undo action for a network step.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Release {
    Delete(String),
    ClearMaster(String),
    SetDown(String),
}

/// Runs registered release actions in reverse unless disarmed.
struct Rollback<'a> {
    net: &'a dyn NetworkPrimitives,
    actions: Vec<Release>,
}

impl<'a> Rollback<'a> {
    fn new(net: &'a dyn NetworkPrimitives) -> Self {
        Self {
            net,
            actions: Vec::new(),
        }
    }

    fn register(&mut self, action: Release) {
        self.actions.push(action);
    }

    fn disarm(mut self) {
        self.actions.clear();
    }
}

impl Drop for Rollback<'_> {
    fn drop(&mut self) {
        while let Some(action) = self.actions.pop() {
            let result = match &action {
                Release::Delete(iface) => self.net.delete(iface),
                Release::ClearMaster(iface) => self.net.clear_master(iface),
                Release::SetDown(iface) => self.net.set_down(iface),
            };
            match result {
                Ok(()) => tracing::debug!(action = ?action, "network step rolled back"),
                Err(e) => tracing::warn!(action = ?action, error = %e, "network rollback failed"),
            }
        }
    }
}

/// Wires a veth pair into the namespace of `pid` and sends the peer name.
///
/// Consumes the control channel: it is closed after the name is written,
/// and on failure it is closed without a payload.
///
/// # Errors
///
/// Returns a [`LaunchStep::Network`] error for a failing primitive and a
/// [`LaunchStep::Handshake`] error if the name cannot be written.
pub fn bootstrap(
    net: &dyn NetworkPrimitives,
    config: &NetworkConfig,
    pid: u32,
    control: ControlChannel,
) -> Result<VethPair> {
    let pair = create_veth_pair(net, &config.prefix, VETH_CREATE_ATTEMPTS).step(LaunchStep::Network)?;
    let mut rollback = Rollback::new(net);
    rollback.register(Release::Delete(pair.host.clone()));

    net.set_master(&pair.host, &config.bridge).step(LaunchStep::Network)?;
    rollback.register(Release::ClearMaster(pair.host.clone()));

    net.set_up(&pair.host).step(LaunchStep::Network)?;
    rollback.register(Release::SetDown(pair.host.clone()));

    net.move_to_namespace(&pair.peer, pid).step(LaunchStep::Network)?;
    tracing::info!(pair = %pair, bridge = %config.bridge, pid, "veth pair wired");

    control.send(&pair.peer).step(LaunchStep::Handshake)?;
    rollback.disarm();
    Ok(pair)
}
