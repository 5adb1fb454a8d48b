//! Sandbox configuration: the launcher-facing spec, the validated config
//! shared by Supervisor and Init, and the numeric-or-max limit type used for
//! cgroup serialization.

use std::os::unix::io::RawFd;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::ConfigError;

const HOSTNAME_MAX: usize = 64;

/// A cgroup limit that is either a concrete value or the literal `max`.
///
/// The launcher interface encodes "no limit" as the sentinel −1; inside the
/// crate the distinction is carried by the type, not a magic integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Unlimited,
    Exact(u64),
}

impl Limit {
    /// Maps the launcher sentinel: −1 means unlimited, non-negative values
    /// are taken literally. Other negatives are rejected.
    pub fn from_sentinel(raw: i64) -> Option<Self> {
        match raw {
            -1 => Some(Limit::Unlimited),
            n if n >= 0 => Some(Limit::Exact(n as u64)),
            _ => None,
        }
    }

    /// The exact byte string written into a cgroup control file.
    pub fn write_repr(&self) -> String {
        match self {
            Limit::Unlimited => "max\n".to_string(),
            Limit::Exact(n) => format!("{n}\n"),
        }
    }
}

/// Launcher input, deserialized from a JSON spec file.
///
/// Limits use the raw −1 sentinel; all validation happens in
/// [`SandboxConfig::from_spec`]. Defaults match a one-core, 512 MB, no-swap
/// sandbox.
#[derive(Debug, Clone, Deserialize)]
pub struct SandboxSpec {
    #[serde(default = "default_hostname")]
    pub hostname: String,
    pub rootfs: PathBuf,
    pub cmd: Vec<String>,
    #[serde(default = "default_cpu_max")]
    pub cpu_max: String,
    #[serde(default = "default_mem_max")]
    pub mem_max: i64,
    #[serde(default = "unlimited")]
    pub mem_high: i64,
    #[serde(default)]
    pub mem_swap_max: i64,
    #[serde(default = "default_pids_max")]
    pub pids_max: i64,
    pub overlay_base: PathBuf,
    #[serde(default = "default_tmpfs_size_mb")]
    pub tmpfs_size_mb: u32,
}

fn default_hostname() -> String {
    "euclid".to_string()
}

fn default_cpu_max() -> String {
    // One full core: quota == period.
    "100000 100000".to_string()
}

fn default_mem_max() -> i64 {
    512_000_000
}

fn unlimited() -> i64 {
    -1
}

fn default_pids_max() -> i64 {
    256
}

fn default_tmpfs_size_mb() -> u32 {
    64
}

/// The validated parameter bundle shared by Supervisor and Init.
///
/// Immutable after construction. Init reads it through the address-space
/// snapshot taken by `clone`; the pipe ends are the only fields it consumes
/// before the Supervisor releases it.
#[derive(Debug)]
pub struct SandboxConfig {
    pub hostname: String,
    pub rootfs: PathBuf,
    pub cmd: Vec<String>,
    pub cpu_max: String,
    pub mem_max: Limit,
    pub mem_high: Limit,
    pub mem_swap_max: Limit,
    pub pids_max: Limit,
    pub overlay_base: PathBuf,
    pub tmpfs_size_mb: u32,
    pub sync_read: RawFd,
    pub sync_write: RawFd,
}

impl SandboxConfig {
    /// Validates a launcher spec against every configuration precondition.
    ///
    /// Fails before any process is spawned; a config that passes here cannot
    /// fail CString conversion at exec time.
    pub fn from_spec(
        spec: SandboxSpec,
        sync_read: RawFd,
        sync_write: RawFd,
    ) -> Result<Self, ConfigError> {
        if spec.hostname.is_empty()
            || !spec.hostname.is_ascii()
            || spec.hostname.len() > HOSTNAME_MAX
        {
            return Err(ConfigError::InvalidHostname {
                got: spec.hostname,
                max: HOSTNAME_MAX,
            });
        }

        if !spec.rootfs.is_absolute() || !spec.rootfs.is_dir() {
            return Err(ConfigError::InvalidRootfs(spec.rootfs.display().to_string()));
        }

        if !spec.overlay_base.is_absolute() {
            return Err(ConfigError::InvalidOverlayBase(
                spec.overlay_base.display().to_string(),
            ));
        }

        if spec.overlay_base.starts_with(&spec.rootfs) || spec.rootfs.starts_with(&spec.overlay_base)
        {
            return Err(ConfigError::OverlappingPaths {
                rootfs: spec.rootfs.display().to_string(),
                overlay_base: spec.overlay_base.display().to_string(),
            });
        }

        if spec.cmd.is_empty() {
            return Err(ConfigError::EmptyCommand);
        }
        for (index, arg) in spec.cmd.iter().enumerate() {
            if arg.as_bytes().contains(&0) {
                return Err(ConfigError::NulInCommand { index });
            }
        }

        if !cpu_max_is_valid(&spec.cpu_max) {
            return Err(ConfigError::InvalidCpuMax(spec.cpu_max));
        }

        let mem_max = Limit::from_sentinel(spec.mem_max).ok_or(ConfigError::InvalidLimit {
            field: "memory.max",
            got: spec.mem_max,
        })?;
        let mem_high = Limit::from_sentinel(spec.mem_high).ok_or(ConfigError::InvalidLimit {
            field: "memory.high",
            got: spec.mem_high,
        })?;
        let mem_swap_max =
            Limit::from_sentinel(spec.mem_swap_max).ok_or(ConfigError::InvalidLimit {
                field: "memory.swap.max",
                got: spec.mem_swap_max,
            })?;

        if let (Limit::Exact(high), Limit::Exact(max)) = (mem_high, mem_max) {
            if high > max {
                return Err(ConfigError::MemHighAboveMax { high, max });
            }
        }

        let pids_max = match Limit::from_sentinel(spec.pids_max) {
            Some(Limit::Exact(0)) | None => return Err(ConfigError::InvalidPidsMax),
            Some(limit) => limit,
        };

        if spec.tmpfs_size_mb == 0 {
            return Err(ConfigError::InvalidTmpfsSize);
        }

        Ok(SandboxConfig {
            hostname: spec.hostname,
            rootfs: spec.rootfs,
            cmd: spec.cmd,
            cpu_max: spec.cpu_max,
            mem_max,
            mem_high,
            mem_swap_max,
            pids_max,
            overlay_base: spec.overlay_base,
            tmpfs_size_mb: spec.tmpfs_size_mb,
            sync_read,
            sync_write,
        })
    }
}

/// Checks a `cpu.max` literal against the cgroup v2 file grammar:
/// `max PERIOD` or `QUOTA PERIOD`, separated by a single space.
///
/// The kernel rejects comma-separated values, so the config does too.
pub fn cpu_max_is_valid(value: &str) -> bool {
    let mut parts = value.split(' ');
    let (Some(quota), Some(period), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    let quota_ok = quota == "max" || (!quota.is_empty() && quota.bytes().all(|b| b.is_ascii_digit()));
    let period_ok = !period.is_empty() && period.bytes().all(|b| b.is_ascii_digit());
    quota_ok && period_ok
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_spec(rootfs: &std::path::Path, overlay: &std::path::Path) -> SandboxSpec {
        SandboxSpec {
            hostname: "euclid".into(),
            rootfs: rootfs.to_path_buf(),
            cmd: vec!["/bin/echo".into(), "hello".into()],
            cpu_max: "100000 100000".into(),
            mem_max: 536_870_912,
            mem_high: 483_183_820,
            mem_swap_max: 0,
            pids_max: 256,
            overlay_base: overlay.to_path_buf(),
            tmpfs_size_mb: 64,
        }
    }

    fn build(spec: SandboxSpec) -> Result<SandboxConfig, ConfigError> {
        SandboxConfig::from_spec(spec, -1, -1)
    }

    #[test]
    fn accepts_a_complete_spec() {
        let rootfs = tempfile::tempdir().unwrap();
        let overlay = tempfile::tempdir().unwrap();
        let cfg = build(base_spec(rootfs.path(), overlay.path())).unwrap();
        assert_eq!(cfg.mem_max, Limit::Exact(536_870_912));
        assert_eq!(cfg.pids_max, Limit::Exact(256));
    }

    #[test]
    fn sentinel_maps_to_unlimited() {
        let rootfs = tempfile::tempdir().unwrap();
        let overlay = tempfile::tempdir().unwrap();
        let mut spec = base_spec(rootfs.path(), overlay.path());
        spec.mem_max = -1;
        spec.mem_high = -1;
        let cfg = build(spec).unwrap();
        assert_eq!(cfg.mem_max, Limit::Unlimited);
        assert_eq!(cfg.mem_max.write_repr(), "max\n");
    }

    #[test]
    fn rejects_empty_command() {
        let rootfs = tempfile::tempdir().unwrap();
        let overlay = tempfile::tempdir().unwrap();
        let mut spec = base_spec(rootfs.path(), overlay.path());
        spec.cmd.clear();
        assert!(matches!(build(spec), Err(ConfigError::EmptyCommand)));
    }

    #[test]
    fn rejects_nul_in_argv() {
        let rootfs = tempfile::tempdir().unwrap();
        let overlay = tempfile::tempdir().unwrap();
        let mut spec = base_spec(rootfs.path(), overlay.path());
        spec.cmd.push("a\0b".into());
        assert!(matches!(
            build(spec),
            Err(ConfigError::NulInCommand { index: 2 })
        ));
    }

    #[test]
    fn rejects_relative_rootfs() {
        let overlay = tempfile::tempdir().unwrap();
        let spec = base_spec(std::path::Path::new("alpine"), overlay.path());
        assert!(matches!(build(spec), Err(ConfigError::InvalidRootfs(_))));
    }

    #[test]
    fn rejects_overlay_inside_rootfs() {
        let rootfs = tempfile::tempdir().unwrap();
        let mut spec = base_spec(rootfs.path(), rootfs.path());
        spec.overlay_base = rootfs.path().join("ovl");
        assert!(matches!(
            build(spec),
            Err(ConfigError::OverlappingPaths { .. })
        ));
    }

    #[test]
    fn rejects_mem_high_above_max() {
        let rootfs = tempfile::tempdir().unwrap();
        let overlay = tempfile::tempdir().unwrap();
        let mut spec = base_spec(rootfs.path(), overlay.path());
        spec.mem_max = 100;
        spec.mem_high = 200;
        assert!(matches!(
            build(spec),
            Err(ConfigError::MemHighAboveMax { high: 200, max: 100 })
        ));
    }

    #[test]
    fn unlimited_mem_max_skips_the_ordering_check() {
        let rootfs = tempfile::tempdir().unwrap();
        let overlay = tempfile::tempdir().unwrap();
        let mut spec = base_spec(rootfs.path(), overlay.path());
        spec.mem_max = -1;
        spec.mem_high = 200;
        assert!(build(spec).is_ok());
    }

    #[test]
    fn rejects_zero_pids_max() {
        let rootfs = tempfile::tempdir().unwrap();
        let overlay = tempfile::tempdir().unwrap();
        let mut spec = base_spec(rootfs.path(), overlay.path());
        spec.pids_max = 0;
        assert!(matches!(build(spec), Err(ConfigError::InvalidPidsMax)));
    }

    #[test]
    fn rejects_oversized_hostname() {
        let rootfs = tempfile::tempdir().unwrap();
        let overlay = tempfile::tempdir().unwrap();
        let mut spec = base_spec(rootfs.path(), overlay.path());
        spec.hostname = "h".repeat(65);
        assert!(matches!(
            build(spec),
            Err(ConfigError::InvalidHostname { .. })
        ));
    }

    #[test]
    fn cpu_max_grammar() {
        assert!(cpu_max_is_valid("100000 100000"));
        assert!(cpu_max_is_valid("max 100000"));
        // The comma form the kernel rejects.
        assert!(!cpu_max_is_valid("100000, 100000"));
        assert!(!cpu_max_is_valid("100000"));
        assert!(!cpu_max_is_valid("100000  100000"));
        assert!(!cpu_max_is_valid(" 100000 100000"));
        assert!(!cpu_max_is_valid("max"));
        assert!(!cpu_max_is_valid(""));
        assert!(!cpu_max_is_valid("100000 100000 "));
    }

    #[test]
    fn spec_defaults_fill_the_limits() {
        let rootfs = tempfile::tempdir().unwrap();
        let overlay = tempfile::tempdir().unwrap();
        let json = serde_json::json!({
            "rootfs": rootfs.path(),
            "overlay_base": overlay.path(),
            "cmd": ["/bin/sh"],
        });
        let spec: SandboxSpec = serde_json::from_value(json).unwrap();
        assert_eq!(spec.hostname, "euclid");
        assert_eq!(spec.cpu_max, "100000 100000");
        assert_eq!(spec.pids_max, 256);
        assert_eq!(spec.mem_swap_max, 0);
        assert!(build(spec).is_ok());
    }
}
