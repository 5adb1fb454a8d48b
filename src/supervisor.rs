//! Supervisor-side orchestrator.
//!
//! The Supervisor owns the whole lifecycle: it creates the sync pipe,
//! spawns Init inside fresh namespaces, configures the cgroup, releases
//! Init, and reaps and decodes the exit. The release byte is the only
//! happens-after edge between the cgroup writes and Init's self-join.

use std::fmt;

use nix::sched::CloneFlags;
use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::Pid;
use tracing::{debug, info, warn};

use crate::cgroup::CgroupDriver;
use crate::config::{SandboxConfig, SandboxSpec};
use crate::error::{Result, SandboxError};
use crate::init;
use crate::sync::{ReleaseOutcome, SyncChannel};

/// Stack for the cloned Init task. Init's user-space work before exec is
/// shallow; 1 MiB matches it comfortably.
const STACK_SIZE: usize = 1024 * 1024;

/// How the sandboxed process terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReport {
    Exited { code: i32 },
    Signaled { signal: Signal },
}

impl ExitReport {
    /// SIGSYS is what seccomp's kill-process action delivers.
    pub fn is_seccomp_violation(&self) -> bool {
        matches!(
            self,
            ExitReport::Signaled {
                signal: Signal::SIGSYS
            }
        )
    }
}

impl fmt::Display for ExitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReport::Exited { code } => write!(f, "sandbox exited with code {code}"),
            ExitReport::Signaled { signal } => {
                write!(
                    f,
                    "sandbox killed by signal {} ({})",
                    *signal as i32,
                    signal.as_str()
                )?;
                if self.is_seccomp_violation() {
                    write!(f, "; likely seccomp violation")?;
                }
                Ok(())
            }
        }
    }
}

/// Runs the full bring-up choreography for one sandbox and waits for it.
///
/// Configuration errors return before any child exists. After a successful
/// spawn every failure path still reaps Init, so no zombie outlives the
/// call.
pub fn run(spec: SandboxSpec) -> Result<ExitReport> {
    // A dead Init must surface as EPIPE on the release write, not SIGPIPE.
    unsafe { signal::signal(Signal::SIGPIPE, SigHandler::SigIgn) }
        .map_err(|e| SandboxError::os("ignore SIGPIPE", e))?;

    let channel = SyncChannel::new()?;
    let cfg = SandboxConfig::from_spec(spec, channel.read_fd(), channel.write_fd())?;
    let cgroups = CgroupDriver::new();

    let pid = spawn_init(&cfg)?;
    info!(pid = pid.as_raw(), hostname = %cfg.hostname, "init spawned");

    if let Err(e) = cgroups.configure(&cfg) {
        // No release byte is ever written: dropping the channel EOFs Init,
        // which aborts before joining the cgroup.
        drop(channel);
        let _ = waitpid(pid, None);
        return Err(e);
    }

    match channel.release() {
        Ok(ReleaseOutcome::Delivered) => debug!("release byte delivered"),
        Ok(ReleaseOutcome::InitGone) => warn!("init exited before release"),
        Err(e) => {
            // The channel is gone either way, so Init has unblocked (EOF)
            // and will exit on its own; reap it before surfacing the error.
            let _ = waitpid(pid, None);
            return Err(e);
        }
    }

    let report = wait_for_init(pid)?;
    info!(%report, "sandbox finished");

    cgroups.cleanup();
    Ok(report)
}

/// Creates the Init task with its own UTS, PID, mount, network, and IPC
/// namespaces. SIGCHLD makes it reapable with waitpid.
fn spawn_init(cfg: &SandboxConfig) -> Result<Pid> {
    let mut stack = vec![0u8; STACK_SIZE];
    let flags = CloneFlags::CLONE_NEWUTS
        | CloneFlags::CLONE_NEWPID
        | CloneFlags::CLONE_NEWNS
        | CloneFlags::CLONE_NEWNET
        | CloneFlags::CLONE_NEWIPC;

    let entry = Box::new(|| init::run(cfg) as isize);

    // The child snapshots the address space, including this stack, so the
    // Supervisor's copy can be freed as soon as clone returns.
    unsafe { nix::sched::clone(entry, &mut stack, flags, Some(Signal::SIGCHLD as libc::c_int)) }
        .map_err(|e| SandboxError::os("clone", e))
}

fn wait_for_init(pid: Pid) -> Result<ExitReport> {
    loop {
        match waitpid(pid, None).map_err(|e| SandboxError::os("waitpid", e))? {
            WaitStatus::Exited(_, code) => return Ok(ExitReport::Exited { code }),
            WaitStatus::Signaled(_, signal, _) => return Ok(ExitReport::Signaled { signal }),
            other => debug!(?other, "intermediate wait status"),
        }
    }
}
