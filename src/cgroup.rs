//! cgroup v2 driver for the sandbox's resource limits.
//!
//! The Supervisor configures `/sys/fs/cgroup/euclid` before releasing Init;
//! Init joins it as its very first post-release action. Both sides assume a
//! unified (v2) hierarchy.

use std::fs::{DirBuilder, OpenOptions};
use std::io::{ErrorKind, Write};
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::SandboxConfig;
use crate::error::{Result, SandboxError};

const CGROUP_ROOT: &str = "/sys/fs/cgroup";
const GROUP_NAME: &str = "euclid";
const CONTROLLERS: &str = "+cpu +memory +pids\n";

/// Driver over the kernel-side cgroup state.
///
/// The root is the mount point of the unified hierarchy; overriding it is
/// only useful for pointing the driver at a delegated subtree (or a test
/// fixture).
pub struct CgroupDriver {
    root: PathBuf,
}

impl Default for CgroupDriver {
    fn default() -> Self {
        CgroupDriver {
            root: PathBuf::from(CGROUP_ROOT),
        }
    }
}

impl CgroupDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        CgroupDriver { root: root.into() }
    }

    fn group_dir(&self) -> PathBuf {
        self.root.join(GROUP_NAME)
    }

    /// Supervisor side: enables controllers, creates the group, writes every
    /// limit file. Fails fast on the first error; partially written limits
    /// are left in place for post-mortem inspection.
    pub fn configure(&self, cfg: &SandboxConfig) -> Result<()> {
        let subtree = self.root.join("cgroup.subtree_control");
        if !subtree.exists() {
            return Err(SandboxError::KernelFeature {
                feature: "cgroup v2 unified hierarchy",
            });
        }

        // Enabling controllers that are already enabled can fail with EBUSY
        // or EINVAL depending on the kernel; the limit writes below are the
        // authoritative check.
        if let Err(e) = write_file(&subtree, CONTROLLERS, "enable cgroup controllers") {
            warn!(error = %e, "cgroup.subtree_control write failed, continuing");
        }

        let group = self.group_dir();
        match DirBuilder::new().mode(0o755).create(&group) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(SandboxError::Os {
                    op: "create cgroup directory",
                    source: e,
                })
            }
        }

        write_file(&group.join("cpu.max"), &format!("{}\n", cfg.cpu_max), "write cpu.max")?;
        write_file(&group.join("memory.max"), &cfg.mem_max.write_repr(), "write memory.max")?;
        write_file(&group.join("memory.high"), &cfg.mem_high.write_repr(), "write memory.high")?;
        write_file(
            &group.join("memory.swap.max"),
            &cfg.mem_swap_max.write_repr(),
            "write memory.swap.max",
        )?;
        write_file(&group.join("pids.max"), &cfg.pids_max.write_repr(), "write pids.max")?;

        debug!(group = %group.display(), "cgroup configured");
        Ok(())
    }

    /// Init side: moves the calling process into the group. The kernel reads
    /// `0` as "the writer itself", so Init never needs to know its own PID.
    pub fn join_self(&self) -> Result<()> {
        write_file(
            &self.group_dir().join("cgroup.procs"),
            "0\n",
            "join cgroup",
        )
    }

    /// Post-wait removal of the group directory. Best-effort: the directory
    /// carries no state worth failing over once the child is reaped.
    pub fn cleanup(&self) {
        if let Err(e) = std::fs::remove_dir(self.group_dir()) {
            debug!(error = %e, "leaving cgroup directory behind");
        }
    }
}

fn write_file(path: &Path, contents: &str, op: &'static str) -> Result<()> {
    // std file descriptors are close-on-exec, and the handle is closed on
    // scope exit, before the next bring-up step runs.
    let mut file = OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|e| SandboxError::Os { op, source: e })?;
    file.write_all(contents.as_bytes())
        .map_err(|e| SandboxError::Os { op, source: e })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SandboxConfig, SandboxSpec};

    struct Fixture {
        root: tempfile::TempDir,
        driver: CgroupDriver,
        cfg: SandboxConfig,
        _rootfs: tempfile::TempDir,
        _overlay: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("cgroup.subtree_control"), "").unwrap();
        let driver = CgroupDriver::with_root(root.path());

        let rootfs = tempfile::tempdir().unwrap();
        let overlay = tempfile::tempdir().unwrap();
        let spec = SandboxSpec {
            hostname: "euclid".into(),
            rootfs: rootfs.path().to_path_buf(),
            cmd: vec!["/bin/sh".into()],
            cpu_max: "100000 100000".into(),
            mem_max: 536_870_912,
            mem_high: -1,
            mem_swap_max: 0,
            pids_max: 256,
            overlay_base: overlay.path().to_path_buf(),
            tmpfs_size_mb: 64,
        };
        let cfg = SandboxConfig::from_spec(spec, -1, -1).unwrap();
        Fixture {
            root,
            driver,
            cfg,
            _rootfs: rootfs,
            _overlay: overlay,
        }
    }

    fn seed_limit_files(group: &Path) {
        std::fs::create_dir_all(group).unwrap();
        for name in [
            "cpu.max",
            "memory.max",
            "memory.high",
            "memory.swap.max",
            "pids.max",
            "cgroup.procs",
        ] {
            std::fs::write(group.join(name), "").unwrap();
        }
    }

    #[test]
    fn configure_writes_every_limit_file() {
        let fx = fixture();
        seed_limit_files(&fx.root.path().join(GROUP_NAME));

        fx.driver.configure(&fx.cfg).unwrap();

        let group = fx.root.path().join(GROUP_NAME);
        let read = |name: &str| std::fs::read_to_string(group.join(name)).unwrap();
        assert_eq!(read("cpu.max"), "100000 100000\n");
        assert_eq!(read("memory.max"), "536870912\n");
        assert_eq!(read("memory.high"), "max\n");
        assert_eq!(read("memory.swap.max"), "0\n");
        assert_eq!(read("pids.max"), "256\n");
    }

    #[test]
    fn configure_requires_a_unified_hierarchy() {
        let bare_root = tempfile::tempdir().unwrap();
        let driver = CgroupDriver::with_root(bare_root.path());
        let fx = fixture();
        assert!(matches!(
            driver.configure(&fx.cfg),
            Err(SandboxError::KernelFeature { .. })
        ));
    }

    #[test]
    fn join_self_writes_zero() {
        let fx = fixture();
        let group = fx.root.path().join(GROUP_NAME);
        seed_limit_files(&group);

        fx.driver.join_self().unwrap();
        assert_eq!(
            std::fs::read_to_string(group.join("cgroup.procs")).unwrap(),
            "0\n"
        );
    }

    #[test]
    fn cleanup_tolerates_a_missing_group() {
        let root = tempfile::tempdir().unwrap();
        CgroupDriver::with_root(root.path()).cleanup();
    }
}
