//! Veth pair naming and creation.

use nsinit_common::constants::VETH_SUFFIX_LEN;
use nsinit_common::error::{NsinitError, Result};
use nsinit_common::types::VethPair;

use super::NetworkPrimitives;

/// Returns `prefix` followed by [`VETH_SUFFIX_LEN`] random lowercase hex digits.
#[must_use]
pub fn generate_name(prefix: &str) -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}{}", &random[..VETH_SUFFIX_LEN])
}

fn generate_pair(prefix: &str) -> VethPair {
    let host = generate_name(prefix);
    loop {
        let peer = generate_name(prefix);
        if peer != host {
            return VethPair { host, peer };
        }
    }
}

/// Creates a veth pair with freshly generated names.
///
/// A name collision reported by `net` regenerates both names and retries,
/// up to `attempts` times. Any other failure is returned immediately.
///
/// # Errors
///
/// Returns the creation error, or [`NsinitError::InterfaceExists`] if every
/// attempt collided.
pub fn create_veth_pair(
    net: &dyn NetworkPrimitives,
    prefix: &str,
    attempts: usize,
) -> Result<VethPair> {
    let mut last_collision = None;
    for attempt in 1..=attempts.max(1) {
        let pair = generate_pair(prefix);
        match net.create_veth_pair(&pair.host, &pair.peer) {
            Ok(()) => {
                tracing::debug!(host = %pair.host, peer = %pair.peer, attempt, "veth pair created");
                return Ok(pair);
            }
            Err(e) if e.is_interface_exists() => {
                tracing::debug!(pair = %pair, attempt, "veth name collision, retrying");
                last_collision = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_collision.unwrap_or_else(|| NsinitError::InterfaceExists {
        name: prefix.to_string(),
    }))
}
