//! euclid: a minimal Linux process sandbox.
//!
//! Given a command, a root filesystem, a hostname, and a set of resource
//! limits, euclid runs the command as PID 1 of fresh UTS, PID, mount,
//! network, and IPC namespaces, on a writable overlay over a read-only
//! rootfs, inside a cgroup v2 resource envelope, with all capabilities
//! dropped and a whitelist seccomp filter installed.
//!
//! Two processes cooperate. The [`supervisor`] creates a one-shot pipe,
//! clones the Init task, writes the cgroup limits, and only then releases
//! Init with a single byte. [`init`] blocks on that byte, joins the cgroup,
//! assembles the overlay, pivots the root, locks itself down, and execs the
//! target. The ordering is security-critical end to end: no-new-privs
//! before seccomp, cgroup limits before the join, mount privatization
//! before any mount.

pub mod config;
pub mod error;
pub mod observability;

#[cfg(target_os = "linux")]
pub mod cgroup;
#[cfg(target_os = "linux")]
pub mod init;
#[cfg(target_os = "linux")]
pub mod seccomp;
#[cfg(target_os = "linux")]
pub mod supervisor;
#[cfg(target_os = "linux")]
pub mod sync;

pub use config::{Limit, SandboxConfig, SandboxSpec};
pub use error::{ConfigError, SandboxError};
#[cfg(target_os = "linux")]
pub use supervisor::ExitReport;
