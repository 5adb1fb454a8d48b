//! One-shot synchronization barrier between Supervisor and Init.
//!
//! A single anonymous pipe: Init blocks on a 1-byte read until the
//! Supervisor has finished configuring the cgroup. The pipe doubles as a
//! liveness signal, EOF on the read end means the Supervisor died before
//! releasing the sandbox.

use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use crate::error::{Result, SandboxError};

/// The byte value is ignored by the reader; only its arrival matters.
const RELEASE_BYTE: u8 = b'c';

/// Outcome of the Supervisor-side release write.
#[derive(Debug, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Delivered,
    /// Init closed its read end (it already died); the Supervisor proceeds
    /// to wait and reports the exit.
    InitGone,
}

/// Supervisor-owned pipe ends. Created before Init is spawned so both ends
/// are inherited across `clone`.
pub struct SyncChannel {
    read: OwnedFd,
    write: OwnedFd,
}

impl SyncChannel {
    pub fn new() -> Result<Self> {
        let (read, write) = nix::unistd::pipe().map_err(|e| SandboxError::os("pipe", e))?;
        Ok(SyncChannel { read, write })
    }

    pub fn read_fd(&self) -> RawFd {
        self.read.as_raw_fd()
    }

    pub fn write_fd(&self) -> RawFd {
        self.write.as_raw_fd()
    }

    /// Writes the single release byte. Consumes the channel; it is one-shot.
    ///
    /// The read end is dropped first so that this process holds no fd that
    /// could mask a dead reader.
    pub fn release(self) -> Result<ReleaseOutcome> {
        drop(self.read);
        let mut writer = File::from(self.write);
        match writer.write_all(&[RELEASE_BYTE]) {
            Ok(()) => Ok(ReleaseOutcome::Delivered),
            Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(ReleaseOutcome::InitGone),
            Err(e) => Err(SandboxError::Os {
                op: "write sync pipe",
                source: e,
            }),
        }
    }
}

/// Init-side blocking wait. Takes ownership of Init's copies of both fds.
///
/// The inherited write end is closed before reading; otherwise Init's own fd
/// would keep the pipe open and EOF could never arrive.
pub fn wait_for_release(sync_read: RawFd, sync_write: RawFd) -> Result<()> {
    drop(unsafe { File::from_raw_fd(sync_write) });
    let mut reader = unsafe { File::from_raw_fd(sync_read) };
    let mut byte = [0u8; 1];
    match reader.read_exact(&mut byte) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(SandboxError::SupervisorGone),
        Err(e) => Err(SandboxError::Os {
            op: "read sync pipe",
            source: e,
        }),
    }
}
