//! Init-side orchestrator.
//!
//! This code runs as the first process inside the fresh namespaces (PID 1 of
//! the new PID namespace) and ends by exec'ing the target command. The
//! sequence is load-bearing: nothing here may touch the cgroup, the
//! filesystem, capabilities, or seccomp until the Supervisor's release byte
//! arrives, and the lockdown must be the last step before exec.
//!
//! Diagnostics go straight to stderr; at this point the process sits between
//! `clone` and `execvp`, which is no place for a logging pipeline.

mod namespaces;
mod rootfs;
mod security;

use std::ffi::CString;

use crate::cgroup::CgroupDriver;
use crate::config::SandboxConfig;
use crate::error::Result;
use crate::sync;

/// Exit status for any failure during bring-up.
pub const BRINGUP_FAILURE: i32 = 1;
/// Exit status when the target command cannot be exec'd.
pub const EXEC_FAILURE: i32 = 127;

/// Entry point of the Init process. Only returns on failure; on success the
/// process image is replaced by the target command.
pub fn run(cfg: &SandboxConfig) -> i32 {
    if let Err(e) = bring_up(cfg) {
        eprintln!("euclid: bring-up failed: {e}");
        return BRINGUP_FAILURE;
    }

    let mut argv = Vec::with_capacity(cfg.cmd.len());
    for arg in &cfg.cmd {
        match CString::new(arg.as_str()) {
            Ok(c) => argv.push(c),
            Err(_) => {
                eprintln!("euclid: command contains a NUL byte");
                return EXEC_FAILURE;
            }
        }
    }

    if let Err(e) = nix::unistd::execvp(&argv[0], &argv) {
        eprintln!("euclid: exec {}: {e}", cfg.cmd[0]);
    }
    EXEC_FAILURE
}

fn bring_up(cfg: &SandboxConfig) -> Result<()> {
    // Blocks until the Supervisor has written every cgroup limit; EOF means
    // it died and the sandbox must not come up at all.
    sync::wait_for_release(cfg.sync_read, cfg.sync_write)?;

    CgroupDriver::new().join_self()?;

    namespaces::set_hostname(&cfg.hostname)?;
    namespaces::privatize_mounts()?;

    rootfs::setup(cfg)?;

    security::lockdown()
}
