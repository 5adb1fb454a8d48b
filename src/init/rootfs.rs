//! Overlay assembly and the pivot into the sandbox root.
//!
//! Layering: the configured rootfs stays read-only as the overlay lower
//! layer; `upper` and `work` live on a fresh tmpfs, so every write the
//! sandbox makes vanishes with it. `pivot_root` (rather than chroot)
//! physically rotates the mount tree, which lets the old root be detached
//! and closes the open-directory-handle escape.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::mount::{mount, umount2, MntFlags, MsFlags};
use nix::sys::stat::Mode;

use crate::config::SandboxConfig;
use crate::error::{Result, SandboxError};

const PUT_OLD: &str = ".pivot_old";

pub(super) fn setup(cfg: &SandboxConfig) -> Result<()> {
    let merged = assemble_overlay(cfg)?;
    enter_root(&merged)?;
    mount_proc()?;
    mount_dev()
}

/// Builds tmpfs + overlay under `overlay_base` and returns the merged view,
/// the sandbox's effective root from here on.
fn assemble_overlay(cfg: &SandboxConfig) -> Result<PathBuf> {
    // The base directory may survive a previous run; the tmpfs mounted over
    // it always starts empty.
    match std::fs::create_dir(&cfg.overlay_base) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
        Err(e) => {
            return Err(SandboxError::Os {
                op: "create overlay base",
                source: e,
            })
        }
    }

    let tmpfs_opts = format!("size={}M", cfg.tmpfs_size_mb);
    mount(
        Some("tmpfs"),
        &cfg.overlay_base,
        Some("tmpfs"),
        MsFlags::empty(),
        Some(tmpfs_opts.as_str()),
    )
    .map_err(|e| SandboxError::os("mount tmpfs", e))?;

    let upper = cfg.overlay_base.join("upper");
    let work = cfg.overlay_base.join("work");
    let merged = cfg.overlay_base.join("merged");
    for (dir, op) in [
        (&upper, "create overlay upper"),
        (&work, "create overlay work"),
        (&merged, "create overlay merged"),
    ] {
        std::fs::create_dir(dir).map_err(|e| SandboxError::Os { op, source: e })?;
    }

    let mut overlay_opts = OsString::from("lowerdir=");
    overlay_opts.push(&cfg.rootfs);
    overlay_opts.push(",upperdir=");
    overlay_opts.push(&upper);
    overlay_opts.push(",workdir=");
    overlay_opts.push(&work);
    mount(
        Some("overlay"),
        &merged,
        Some("overlay"),
        MsFlags::empty(),
        Some(overlay_opts.as_os_str()),
    )
    .map_err(|e| match e {
        Errno::ENODEV => SandboxError::KernelFeature {
            feature: "overlayfs",
        },
        e => SandboxError::os("mount overlay", e),
    })?;

    Ok(merged)
}

/// Rotates the mount tree so `new_root` becomes `/`, then detaches and
/// removes the old root.
fn enter_root(new_root: &Path) -> Result<()> {
    // pivot_root requires its new-root argument to be a mount point; the
    // recursive self-bind guarantees that.
    mount(
        Some(new_root),
        new_root,
        None::<&str>,
        MsFlags::MS_BIND | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(|e| SandboxError::os("bind new root", e))?;

    let put_old = new_root.join(PUT_OLD);
    match nix::unistd::mkdir(&put_old, Mode::S_IRWXU) {
        Ok(()) | Err(Errno::EEXIST) => {}
        Err(e) => return Err(SandboxError::os("create .pivot_old", e)),
    }

    nix::unistd::pivot_root(new_root, &put_old)
        .map_err(|e| SandboxError::os("pivot_root", e))?;

    nix::unistd::chdir("/").map_err(|e| SandboxError::os("chdir to new root", e))?;

    // MNT_DETACH cuts the sandbox off from the host filesystem even while
    // stray references remain.
    let old_root = format!("/{PUT_OLD}");
    umount2(old_root.as_str(), MntFlags::MNT_DETACH)
        .map_err(|e| SandboxError::os("detach old root", e))?;
    std::fs::remove_dir(&old_root).map_err(|e| SandboxError::Os {
        op: "remove .pivot_old",
        source: e,
    })
}

/// A fresh proc mount: the new PID namespace means it lists only sandbox
/// processes.
fn mount_proc() -> Result<()> {
    mount(
        Some("proc"),
        "/proc",
        Some("proc"),
        MsFlags::empty(),
        None::<&str>,
    )
    .map_err(|e| SandboxError::os("mount /proc", e))
}

fn mount_dev() -> Result<()> {
    mount(
        Some("devtmpfs"),
        "/dev",
        Some("devtmpfs"),
        MsFlags::empty(),
        Some(""),
    )
    .map_err(|e| SandboxError::os("mount /dev", e))
}
