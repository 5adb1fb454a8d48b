//! Final privilege lockdown, the last steps before exec.
//!
//! Order matters and is frozen for all descendants once the filter lands:
//! capabilities go first so nothing downstream can repair a filter bug,
//! no-new-privs must precede the seccomp install, and the install itself is
//! irreversible.

use std::io;

use crate::error::{Result, SandboxError};
use crate::seccomp;

const LINUX_CAPABILITY_VERSION_3: u32 = 0x2008_0522;

#[repr(C)]
struct CapUserHeader {
    version: u32,
    pid: i32,
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
struct CapUserData {
    effective: u32,
    permitted: u32,
    inheritable: u32,
}

pub(super) fn lockdown() -> Result<()> {
    drop_bounding_set()?;
    clear_capability_sets()?;
    set_no_new_privs()?;
    seccomp::install()
}

/// Reads the highest capability number the running kernel knows about.
fn last_cap() -> Result<u32> {
    let text = std::fs::read_to_string("/proc/sys/kernel/cap_last_cap").map_err(|e| {
        SandboxError::Os {
            op: "read cap_last_cap",
            source: e,
        }
    })?;
    text.trim().parse().map_err(|_| SandboxError::Os {
        op: "parse cap_last_cap",
        source: io::Error::new(io::ErrorKind::InvalidData, text.trim().to_string()),
    })
}

/// Removes every capability from the bounding set. Dropping is permanent:
/// not even exec of a setuid binary could restore them (and no-new-privs
/// forbids that separately).
fn drop_bounding_set() -> Result<()> {
    for cap in 0..=last_cap()? {
        let rc = unsafe { libc::prctl(libc::PR_CAPBSET_DROP, cap as libc::c_ulong, 0, 0, 0) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            // The kernel reports capability numbers it does not know as
            // EINVAL.
            if err.raw_os_error() != Some(libc::EINVAL) {
                return Err(SandboxError::Os {
                    op: "drop capability bounding set",
                    source: err,
                });
            }
        }
    }
    Ok(())
}

/// Empties the effective, permitted, and inheritable sets via capset with a
/// zeroed v3 payload. pid 0 addresses the calling thread.
fn clear_capability_sets() -> Result<()> {
    let header = CapUserHeader {
        version: LINUX_CAPABILITY_VERSION_3,
        pid: 0,
    };
    let data = [CapUserData::default(); 2];
    let rc = unsafe {
        libc::syscall(
            libc::SYS_capset,
            &header as *const CapUserHeader,
            data.as_ptr(),
        )
    };
    if rc != 0 {
        return Err(SandboxError::Os {
            op: "clear capability sets",
            source: io::Error::last_os_error(),
        });
    }
    Ok(())
}

/// After this flag is set, execve can no longer grant privileges through
/// suid bits or file capabilities. Also the precondition for installing a
/// seccomp filter without CAP_SYS_ADMIN.
fn set_no_new_privs() -> Result<()> {
    let rc = unsafe { libc::prctl(libc::PR_SET_NO_NEW_PRIVS, 1, 0, 0, 0) };
    if rc != 0 {
        return Err(SandboxError::Os {
            op: "set no_new_privs",
            source: io::Error::last_os_error(),
        });
    }
    Ok(())
}
