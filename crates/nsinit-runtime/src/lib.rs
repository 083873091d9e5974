//! Launch and supervision of a container init process.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod error;
pub mod exec;
pub mod exit;
pub mod init;
pub mod network;
pub mod pidfile;
pub mod process;
pub mod relay;
