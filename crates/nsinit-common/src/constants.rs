//! System-wide constants and default paths.

/// Name of the pid marker file, relative to the container directory.
pub const PID_FILE_NAME: &str = ".nspid";

/// Permission bits of the pid marker file.
pub const PID_FILE_MODE: u32 = 0o644;

/// Default container configuration file, relative to the container directory.
pub const CONFIG_FILE_NAME: &str = "container.json";

/// Cgroups v2 unified hierarchy mount point.
pub const CGROUP_V2_PATH: &str = "/sys/fs/cgroup";

/// Default parent cgroup under which container cgroups are created.
pub const DEFAULT_CGROUP_PARENT: &str = "nsinit";

/// Default prefix of generated veth interface names.
pub const DEFAULT_VETH_PREFIX: &str = "veth";

/// Number of random characters appended to the veth prefix.
pub const VETH_SUFFIX_LEN: usize = 4;

/// Kernel limit on interface name length, excluding the trailing NUL.
pub const MAX_INTERFACE_NAME_LEN: usize = 15;

/// Attempts made to create a veth pair before a name collision is fatal.
pub const VETH_CREATE_ATTEMPTS: usize = 8;

/// Exit code reported alongside an error when setup fails.
pub const SETUP_FAILURE_EXIT_CODE: i32 = -1;

/// Argument naming the console flag in the child invocation.
pub const CONSOLE_FLAG: &str = "-console";

/// Subcommand naming the init role in the child invocation.
pub const INIT_ROLE: &str = "init";

/// Time the relay waits for console output to drain after the child exits.
pub const DEFAULT_RELAY_DRAIN_MS: u64 = 250;

/// Size of the buffer used by each relay copy task.
pub const RELAY_BUFFER_SIZE: usize = 4096;
