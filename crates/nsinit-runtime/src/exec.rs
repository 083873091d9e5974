//! The launch sequence.
//!
//! [`Exec`] allocates the console, starts the child inside its namespaces,
//! applies resource limits, wires networking, relays the terminal and
//! reports the child's exit code. Limits are always applied before any
//! network operation, and the control channel is closed only once the
//! host side is fully configured.

use std::time::Duration;

use nsinit_common::config::{ContainerConfig, NetworkConfig};
use nsinit_common::constants::DEFAULT_RELAY_DRAIN_MS;
use nsinit_common::error::NsinitError;
use nsinit_common::types::LaunchState;
use nsinit_core::cgroup::ResourceLimiter;
use nsinit_core::console::Console;
use nsinit_core::network::NetworkPrimitives;
use nsinit_core::terminal::HostTerminal;

use crate::error::{LaunchError, LaunchStep, Result, StepExt};
use crate::exit;
use crate::network::bootstrap;
use crate::process::{LaunchedProcess, Launcher};
use crate::relay::Relay;

/// A configured launch.
pub struct Exec<'a, T: HostTerminal> {
    config: &'a ContainerConfig,
    launcher: &'a Launcher,
    terminal: &'a T,
    limiter: Option<&'a dyn ResourceLimiter>,
    network: Option<&'a dyn NetworkPrimitives>,
    drain: Duration,
}

impl<'a, T: HostTerminal> Exec<'a, T> {
    /// Launch described by `config`, started by `launcher` and attached to
    /// `terminal`.
    #[must_use]
    pub const fn new(config: &'a ContainerConfig, launcher: &'a Launcher, terminal: &'a T) -> Self {
        Self {
            config,
            launcher,
            terminal,
            limiter: None,
            network: None,
            drain: Duration::from_millis(DEFAULT_RELAY_DRAIN_MS),
        }
    }

    /// Applies limits through `limiter` once the child exists.
    #[must_use]
    pub const fn with_limiter(mut self, limiter: &'a dyn ResourceLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Uses `network` for the configured network section.
    #[must_use]
    pub const fn with_network(mut self, network: &'a dyn NetworkPrimitives) -> Self {
        self.network = Some(network);
        self
    }

    /// How long console output may drain after the child exits.
    #[must_use]
    pub const fn with_drain(mut self, drain: Duration) -> Self {
        self.drain = drain;
        self
    }

    /// Runs `args` as the container's init and returns its exit code.
    ///
    /// # Errors
    ///
    /// Returns a [`LaunchError::Setup`] naming the failing step if the
    /// launch could not be completed; the child, if started, is killed and
    /// the pid marker removed. Use [`LaunchError::exit_code`] for the code
    /// to report in that case.
    pub fn run(&self, args: &[String]) -> Result<i32> {
        let network = self.network_plan()?;
        transition(LaunchState::Starting);

        let console = Console::open().step(LaunchStep::Console)?;
        let (mut process, pid_file) =
            self.launcher
                .launch(&self.config.namespaces, console.slave_path(), args)?;
        let pid = process.pid();

        transition(LaunchState::Configuring);
        if let Err(e) = self.configure(&mut process, network) {
            self.abort(&mut process, &e);
            return Err(e);
        }

        let relay = match Relay::attach(self.terminal, console.into_master()) {
            Ok(relay) => relay,
            Err(source) => {
                let e = LaunchError::setup(LaunchStep::Terminal, source);
                self.abort(&mut process, &e);
                return Err(e);
            }
        };
        transition(LaunchState::Running);

        let code = exit::wait(&mut process);
        let report = relay.finish(self.drain);
        tracing::debug!(pid, output = ?report.output, input = ?report.input, "relay report");
        self.release();
        drop(pid_file);

        let code = code?;
        tracing::info!(pid, code, state = %LaunchState::Exited, "launch state");
        Ok(code)
    }

    fn network_plan(&self) -> Result<Option<(&'a dyn NetworkPrimitives, &'a NetworkConfig)>> {
        let config: &'a ContainerConfig = self.config;
        match (&config.network, self.network) {
            (None, _) => Ok(None),
            (Some(config), Some(net)) => Ok(Some((net, config))),
            (Some(_), None) => Err(LaunchError::setup(
                LaunchStep::Network,
                NsinitError::Config {
                    message: "network configured but no network primitives available".into(),
                },
            )),
        }
    }

    fn configure(
        &self,
        process: &mut LaunchedProcess,
        network: Option<(&dyn NetworkPrimitives, &NetworkConfig)>,
    ) -> Result<()> {
        let pid = process.pid();
        if let Some(limiter) = self.limiter {
            limiter.apply(pid).step(LaunchStep::Cgroups)?;
            tracing::debug!(pid, "resource limits applied");
        }

        let Some(control) = process.take_control() else {
            return Err(LaunchError::setup(
                LaunchStep::Handshake,
                NsinitError::Config {
                    message: "control channel already taken".into(),
                },
            ));
        };
        match network {
            Some((net, config)) => {
                let pair = bootstrap(net, config, pid, control)?;
                tracing::info!(pid, peer = %pair.peer, "network handed to child");
            }
            None => control.close(),
        }
        Ok(())
    }

    fn abort(&self, process: &mut LaunchedProcess, error: &LaunchError) {
        tracing::error!(pid = process.pid(), error = %error, state = %LaunchState::Failed, "launch state");
        process.kill();
        self.release();
    }

    fn release(&self) {
        if let Some(limiter) = self.limiter {
            if let Err(e) = limiter.release() {
                tracing::warn!(error = %e, "failed to release resource limits");
            }
        }
    }
}

fn transition(state: LaunchState) {
    tracing::info!(state = %state, "launch state");
}
