//! # nsinit-core
//!
//! Linux primitives sequenced by the nsinit launch.
//!
//! This crate provides safe abstractions over:
//! - **Namespaces**: mapping the configured isolation set to clone flags.
//! - **Cgroups v2**: placing a process in a cgroup and writing its limits.
//! - **Network**: the interface primitives and veth pair naming.
//! - **Console**: pseudo-terminal allocation for the child.
//! - **Terminal**: host window size and raw-mode control.
//!
//! All unsafe system calls are encapsulated in safe wrappers with
//! proper error handling and `// SAFETY:` documentation.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod cgroup;
pub mod console;
pub mod namespace;
pub mod network;
pub mod terminal;
