//! Linux namespace selection for container isolation.
//!
//! The child is created directly inside its namespaces by passing these
//! flags to `clone(2)`.

use nix::sched::CloneFlags;
use nsinit_common::config::NamespaceConfig;

/// Returns the bitwise union of the clone flags requested by `config`.
#[must_use]
pub fn clone_flags(config: &NamespaceConfig) -> CloneFlags {
    let table = [
        (config.pid, CloneFlags::CLONE_NEWPID),
        (config.mount, CloneFlags::CLONE_NEWNS),
        (config.network, CloneFlags::CLONE_NEWNET),
        (config.user, CloneFlags::CLONE_NEWUSER),
        (config.ipc, CloneFlags::CLONE_NEWIPC),
        (config.uts, CloneFlags::CLONE_NEWUTS),
    ];
    let flags = table
        .into_iter()
        .filter(|(enabled, _)| *enabled)
        .fold(CloneFlags::empty(), |acc, (_, flag)| acc | flag);
    tracing::debug!(flags = ?flags, "namespace clone flags");
    flags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_namespaces_yield_empty_flags() {
        assert!(clone_flags(&NamespaceConfig::none()).is_empty());
    }

    #[test]
    fn default_namespaces_map_to_expected_flags() {
        let flags = clone_flags(&NamespaceConfig::default());
        assert_eq!(
            flags,
            CloneFlags::CLONE_NEWPID
                | CloneFlags::CLONE_NEWNS
                | CloneFlags::CLONE_NEWNET
                | CloneFlags::CLONE_NEWIPC
                | CloneFlags::CLONE_NEWUTS
        );
        assert!(!flags.contains(CloneFlags::CLONE_NEWUSER));
    }

    #[test]
    fn single_namespace_sets_single_flag() {
        let config = NamespaceConfig {
            user: true,
            ..NamespaceConfig::none()
        };
        assert_eq!(clone_flags(&config), CloneFlags::CLONE_NEWUSER);
    }
}
