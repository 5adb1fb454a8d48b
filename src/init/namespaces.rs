//! UTS and mount-namespace groundwork, the first steps after release.

use nix::mount::{mount, MsFlags};

use crate::error::{Result, SandboxError};

/// Names the sandbox. CLONE_NEWUTS scopes the change to the new namespace.
pub(super) fn set_hostname(hostname: &str) -> Result<()> {
    nix::unistd::sethostname(hostname).map_err(|e| SandboxError::os("sethostname", e))
}

/// Remounts `/` recursively private. Mandatory before any other mount:
/// without it the tmpfs and overlay mounts would propagate into the host
/// mount namespace.
pub(super) fn privatize_mounts() -> Result<()> {
    mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_REC | MsFlags::MS_PRIVATE,
        None::<&str>,
    )
    .map_err(|e| SandboxError::os("make / private", e))
}
