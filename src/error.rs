use thiserror::Error;

/// Violations of the `SandboxConfig` preconditions.
///
/// These are surfaced to the caller synchronously, before any child process
/// is spawned.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("hostname must be non-empty ASCII of at most {max} bytes, got {got:?}")]
    InvalidHostname { got: String, max: usize },
    #[error("rootfs must be an absolute path to an existing directory: {0}")]
    InvalidRootfs(String),
    #[error("overlay base must be an absolute path: {0}")]
    InvalidOverlayBase(String),
    #[error("rootfs and overlay base must be disjoint: {rootfs} vs {overlay_base}")]
    OverlappingPaths { rootfs: String, overlay_base: String },
    #[error("command must be non-empty")]
    EmptyCommand,
    #[error("command argument {index} contains a NUL byte")]
    NulInCommand { index: usize },
    #[error("cpu.max must match \"max PERIOD\" or \"QUOTA PERIOD\", got {0:?}")]
    InvalidCpuMax(String),
    #[error("memory.high ({high}) exceeds memory.max ({max})")]
    MemHighAboveMax { high: u64, max: u64 },
    #[error("{field} must be -1 (unlimited) or non-negative, got {got}")]
    InvalidLimit { field: &'static str, got: i64 },
    #[error("pids.max must be positive")]
    InvalidPidsMax,
    #[error("tmpfs size must be positive")]
    InvalidTmpfsSize,
}

/// Failures of the bring-up protocol itself.
///
/// Every OS-level failure carries the operation-site tag so the step that
/// broke is visible in the report; errors are never retried.
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("invalid sandbox configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("{op}: {source}")]
    Os {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("kernel feature unavailable: {feature}")]
    KernelFeature { feature: &'static str },

    #[error("supervisor died before releasing the sandbox")]
    SupervisorGone,
}

impl SandboxError {
    pub(crate) fn os(op: &'static str, source: impl Into<std::io::Error>) -> Self {
        SandboxError::Os {
            op,
            source: source.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SandboxError>;
