//! Integration tests for the launch sequence.
//!
//! The init program is a shell script that records the handshake payload
//! and the pid marker into the container directory, then exits with a
//! chosen code. No namespaces are requested, so these run unprivileged.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::io::{self, Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nix::errno::Errno;
use nix::pty::Winsize;
use nix::sys::signal::kill;
use nix::sys::wait::waitpid;
use nix::unistd::Pid;
use nsinit_common::config::{ContainerConfig, NamespaceConfig, NetworkConfig};
use nsinit_common::error::{NsinitError, Result as CoreResult};
use nsinit_core::cgroup::ResourceLimiter;
use nsinit_core::network::NetworkPrimitives;
use nsinit_core::terminal::HostTerminal;
use nsinit_runtime::error::{LaunchError, LaunchStep};
use nsinit_runtime::exec::Exec;
use nsinit_runtime::process::Launcher;

// ── Doubles ──────────────────────────────────────────────────────────

type Log = Arc<Mutex<Vec<String>>>;

fn push(log: &Log, entry: String) {
    log.lock().unwrap().push(entry);
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

struct Limiter {
    log: Log,
    fail: bool,
}

impl ResourceLimiter for Limiter {
    fn apply(&self, pid: u32) -> CoreResult<()> {
        push(&self.log, format!("limits:apply {pid}"));
        if self.fail {
            return Err(NsinitError::Config {
                message: "cgroup refused".into(),
            });
        }
        Ok(())
    }

    fn release(&self) -> CoreResult<()> {
        push(&self.log, "limits:release".into());
        Ok(())
    }
}

struct Network {
    log: Log,
    fail_on: Option<&'static str>,
}

impl Network {
    fn call(&self, op: &'static str, detail: String) -> CoreResult<()> {
        push(&self.log, format!("net:{op} {detail}"));
        if self.fail_on == Some(op) {
            return Err(NsinitError::Network {
                op,
                interface: detail,
                message: "injected".into(),
            });
        }
        Ok(())
    }
}

impl NetworkPrimitives for Network {
    fn create_veth_pair(&self, host: &str, peer: &str) -> CoreResult<()> {
        self.call("create", format!("{host} {peer}"))
    }
    fn set_master(&self, iface: &str, bridge: &str) -> CoreResult<()> {
        self.call("master", format!("{iface} {bridge}"))
    }
    fn clear_master(&self, iface: &str) -> CoreResult<()> {
        self.call("nomaster", iface.into())
    }
    fn set_up(&self, iface: &str) -> CoreResult<()> {
        self.call("up", iface.into())
    }
    fn set_down(&self, iface: &str) -> CoreResult<()> {
        self.call("down", iface.into())
    }
    fn move_to_namespace(&self, iface: &str, pid: u32) -> CoreResult<()> {
        self.call("netns", format!("{iface} {pid}"))
    }
    fn delete(&self, iface: &str) -> CoreResult<()> {
        self.call("delete", iface.into())
    }
}

#[derive(Default)]
struct Terminal {
    log: Log,
    fail_size: bool,
    reap_on_raw: bool,
}

impl HostTerminal for Terminal {
    type State = ();

    fn window_size(&self) -> CoreResult<Winsize> {
        if self.fail_size {
            push(&self.log, "term:size".into());
            return Err(NsinitError::syscall("TIOCGWINSZ", Errno::ENOTTY));
        }
        Ok(Winsize {
            ws_row: 24,
            ws_col: 80,
            ws_xpixel: 0,
            ws_ypixel: 0,
        })
    }
    fn make_raw(&self) -> CoreResult<()> {
        push(&self.log, "term:raw".into());
        if self.reap_on_raw {
            // Collect the child behind the launcher's back.
            let pid = applied_pid(&self.log);
            let _ = waitpid(Pid::from_raw(i32::try_from(pid).unwrap()), None).unwrap();
        }
        Ok(())
    }
    fn restore(&self, (): ()) -> CoreResult<()> {
        push(&self.log, "term:restore".into());
        Ok(())
    }
    fn input(&self) -> CoreResult<Box<dyn Read + Send>> {
        Ok(Box::new(io::empty()))
    }
    fn output(&self) -> CoreResult<Box<dyn Write + Send>> {
        Ok(Box::new(io::sink()))
    }
}

// ── Fixture ──────────────────────────────────────────────────────────

struct Fixture {
    dir: tempfile::TempDir,
    log: Log,
    launcher: Launcher,
}

impl Fixture {
    fn new(exit_code: i32) -> Self {
        Self::with_script(&format!("cp .nspid observed\nexit {exit_code}\n"))
    }

    /// Init program that waits for the handshake, then runs `body`.
    fn with_script(body: &str) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let program = dir.path().join("init.sh");
        std::fs::write(&program, format!("#!/bin/sh\ncat > handshake\n{body}"))
            .expect("write init");
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755))
            .expect("chmod init");
        let launcher = Launcher::new(program, dir.path());
        Self {
            dir,
            log: Log::default(),
            launcher,
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn read(&self, name: &str) -> String {
        std::fs::read_to_string(self.path(name)).expect("read fixture file")
    }

    fn terminal(&self) -> Terminal {
        Terminal {
            log: Arc::clone(&self.log),
            ..Terminal::default()
        }
    }

    fn limiter(&self, fail: bool) -> Limiter {
        Limiter {
            log: Arc::clone(&self.log),
            fail,
        }
    }

    fn network(&self, fail_on: Option<&'static str>) -> Network {
        Network {
            log: Arc::clone(&self.log),
            fail_on,
        }
    }

    fn applied_pid(&self) -> u32 {
        applied_pid(&self.log)
    }
}

fn applied_pid(log: &Log) -> u32 {
    entries(log)
        .iter()
        .find_map(|e| e.strip_prefix("limits:apply ").map(str::to_string))
        .expect("limits applied")
        .parse()
        .expect("pid")
}

fn no_namespaces() -> ContainerConfig {
    ContainerConfig {
        namespaces: NamespaceConfig::none(),
        ..ContainerConfig::default()
    }
}

fn networked() -> ContainerConfig {
    ContainerConfig {
        network: Some(NetworkConfig::new("br0")),
        ..no_namespaces()
    }
}

fn assert_reaped(pid: u32) {
    let alive = kill(Pid::from_raw(i32::try_from(pid).unwrap()), None);
    assert_eq!(alive, Err(Errno::ESRCH));
}

const DRAIN: Duration = Duration::from_millis(20);

// ── Exit codes ───────────────────────────────────────────────────────

#[test]
fn clean_exit_reports_zero() {
    let fx = Fixture::new(0);
    let config = no_namespaces();
    let terminal = fx.terminal();

    let code = Exec::new(&config, &fx.launcher, &terminal)
        .with_drain(DRAIN)
        .run(&["/bin/true".into()])
        .expect("launch");
    assert_eq!(code, 0);
}

#[test]
fn nonzero_exit_is_not_an_error() {
    let fx = Fixture::new(17);
    let config = no_namespaces();
    let terminal = fx.terminal();

    let code = Exec::new(&config, &fx.launcher, &terminal)
        .with_drain(DRAIN)
        .run(&[])
        .expect("launch");
    assert_eq!(code, 17);
}

#[test]
fn child_killed_by_signal_reports_abnormal_exit() {
    let fx = Fixture::with_script("kill -9 $$\n");
    let config = no_namespaces();
    let terminal = fx.terminal();

    let code = Exec::new(&config, &fx.launcher, &terminal)
        .with_drain(DRAIN)
        .run(&[])
        .expect("launch");
    assert_eq!(code, -1);
    assert!(!fx.path(".nspid").exists());
}

// ── Pid marker and terminal ──────────────────────────────────────────

#[test]
fn pid_marker_lives_exactly_as_long_as_the_child() {
    let fx = Fixture::new(0);
    let config = no_namespaces();
    let terminal = fx.terminal();
    let limiter = fx.limiter(false);

    let _ = Exec::new(&config, &fx.launcher, &terminal)
        .with_limiter(&limiter)
        .with_drain(DRAIN)
        .run(&[])
        .expect("launch");

    assert_eq!(fx.read("observed"), fx.applied_pid().to_string());
    assert!(!fx.path(".nspid").exists());
}

#[test]
fn terminal_is_made_raw_and_restored_once() {
    let fx = Fixture::new(3);
    let config = no_namespaces();
    let terminal = fx.terminal();

    let _ = Exec::new(&config, &fx.launcher, &terminal)
        .with_drain(DRAIN)
        .run(&[])
        .expect("launch");

    let log = entries(&fx.log);
    assert_eq!(log, ["term:raw", "term:restore"]);
}

// ── Ordering and handshake ───────────────────────────────────────────

#[test]
fn limits_precede_network_and_peer_name_reaches_child() {
    let fx = Fixture::new(0);
    let config = networked();
    let terminal = fx.terminal();
    let limiter = fx.limiter(false);
    let network = fx.network(None);

    let code = Exec::new(&config, &fx.launcher, &terminal)
        .with_limiter(&limiter)
        .with_network(&network)
        .with_drain(DRAIN)
        .run(&[])
        .expect("launch");
    assert_eq!(code, 0);

    let log = entries(&fx.log);
    let apply = log.iter().position(|e| e.starts_with("limits:apply")).unwrap();
    let first_net = log.iter().position(|e| e.starts_with("net:")).unwrap();
    let raw = log.iter().position(|e| e == "term:raw").unwrap();
    assert!(apply < first_net);
    assert!(first_net < raw);
    assert_eq!(log.last().map(String::as_str), Some("limits:release"));

    let pid = fx.applied_pid();
    let moved = log
        .iter()
        .find_map(|e| e.strip_prefix("net:netns "))
        .expect("peer moved");
    let (peer, target) = moved.split_once(' ').unwrap();
    assert_eq!(target, pid.to_string());
    assert_eq!(fx.read("handshake"), peer);
}

#[test]
fn without_network_the_channel_closes_empty() {
    let fx = Fixture::new(0);
    let config = no_namespaces();
    let terminal = fx.terminal();

    let _ = Exec::new(&config, &fx.launcher, &terminal)
        .with_drain(DRAIN)
        .run(&[])
        .expect("launch");
    assert_eq!(fx.read("handshake"), "");
}

// ── Failures ─────────────────────────────────────────────────────────

#[test]
fn limiter_failure_kills_child_and_skips_network() {
    let fx = Fixture::new(0);
    let config = networked();
    let terminal = fx.terminal();
    let limiter = fx.limiter(true);
    let network = fx.network(None);

    let err = Exec::new(&config, &fx.launcher, &terminal)
        .with_limiter(&limiter)
        .with_network(&network)
        .run(&[])
        .unwrap_err();

    assert_eq!(err.step(), Some(LaunchStep::Cgroups));
    assert_eq!(err.exit_code(), -1);
    assert_reaped(fx.applied_pid());
    assert!(!fx.path(".nspid").exists());
    let log = entries(&fx.log);
    assert!(!log.iter().any(|e| e.starts_with("net:") || e.starts_with("term:")));
    assert_eq!(log.last().map(String::as_str), Some("limits:release"));
}

#[test]
fn network_failure_rolls_back_and_kills_child() {
    let fx = Fixture::new(0);
    let config = networked();
    let terminal = fx.terminal();
    let limiter = fx.limiter(false);
    let network = fx.network(Some("netns"));

    let err = Exec::new(&config, &fx.launcher, &terminal)
        .with_limiter(&limiter)
        .with_network(&network)
        .run(&[])
        .unwrap_err();

    assert_eq!(err.step(), Some(LaunchStep::Network));
    assert_reaped(fx.applied_pid());
    assert!(!fx.path(".nspid").exists());

    let ops: Vec<String> = entries(&fx.log)
        .iter()
        .filter_map(|e| e.strip_prefix("net:"))
        .map(|e| e.split(' ').next().unwrap().to_string())
        .collect();
    assert_eq!(
        ops,
        ["create", "master", "up", "netns", "down", "nomaster", "delete"]
    );
}

#[test]
fn network_without_primitives_is_rejected_before_start() {
    let fx = Fixture::new(0);
    let config = networked();
    let terminal = fx.terminal();
    let limiter = fx.limiter(false);

    let err = Exec::new(&config, &fx.launcher, &terminal)
        .with_limiter(&limiter)
        .run(&[])
        .unwrap_err();

    assert_eq!(err.step(), Some(LaunchStep::Network));
    assert!(entries(&fx.log).is_empty());
    assert!(!fx.path(".nspid").exists());
}

#[test]
fn missing_init_program_fails_to_start() {
    let fx = Fixture::new(0);
    let launcher = Launcher::new(Path::new("/nonexistent/nsinit"), fx.dir.path());
    let config = no_namespaces();
    let terminal = fx.terminal();

    let err = Exec::new(&config, &launcher, &terminal).run(&[]).unwrap_err();
    assert_eq!(err.step(), Some(LaunchStep::Start));
    assert!(entries(&fx.log).is_empty());
}

#[test]
fn terminal_failure_kills_child_and_releases_limits() {
    let fx = Fixture::with_script("exec sleep 30\n");
    let config = no_namespaces();
    let terminal = Terminal {
        fail_size: true,
        ..fx.terminal()
    };
    let limiter = fx.limiter(false);

    let err = Exec::new(&config, &fx.launcher, &terminal)
        .with_limiter(&limiter)
        .run(&[])
        .unwrap_err();

    assert_eq!(err.step(), Some(LaunchStep::Terminal));
    assert_eq!(err.exit_code(), -1);
    assert_reaped(fx.applied_pid());
    assert!(!fx.path(".nspid").exists());
    let log = entries(&fx.log);
    assert!(!log.iter().any(|e| e == "term:raw"));
    assert_eq!(log.last().map(String::as_str), Some("limits:release"));
}

#[test]
fn wait_failure_still_restores_terminal_and_cleans_up() {
    let fx = Fixture::new(0);
    let config = no_namespaces();
    let terminal = Terminal {
        reap_on_raw: true,
        ..fx.terminal()
    };
    let limiter = fx.limiter(false);

    let err = Exec::new(&config, &fx.launcher, &terminal)
        .with_limiter(&limiter)
        .with_drain(DRAIN)
        .run(&[])
        .unwrap_err();

    assert!(matches!(err, LaunchError::Wait { .. }));
    assert_eq!(err.step(), None);
    assert!(matches!(
        err.cause(),
        NsinitError::Syscall { op: "waitpid", .. }
    ));
    assert!(!fx.path(".nspid").exists());
    let log = entries(&fx.log);
    assert!(log.iter().any(|e| e == "term:restore"));
    assert_eq!(log.last().map(String::as_str), Some("limits:release"));
}
