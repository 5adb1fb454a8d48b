//! Whitelist seccomp-BPF program.
//!
//! The allowlist is a static table of host-architecture syscall numbers; a
//! tiny assembler turns it into the classic BPF shape: load the syscall
//! number, one equality/allow pair per entry, and an unconditional
//! kill-process tail. Once installed the filter is irremovable for the
//! process and all descendants.

use libc::{c_long, sock_filter, sock_fprog};

use crate::error::{Result, SandboxError};

const BPF_LD: u16 = 0x00;
const BPF_W: u16 = 0x00;
const BPF_ABS: u16 = 0x20;
const BPF_JMP: u16 = 0x05;
const BPF_JEQ: u16 = 0x10;
const BPF_RET: u16 = 0x06;
const BPF_K: u16 = 0x00;

const SECCOMP_RET_ALLOW: u32 = 0x7fff_0000;

// Offset of `nr` in struct seccomp_data.
const SECCOMP_DATA_NR_OFFSET: u32 = 0;

/// Syscalls the sandboxed process may execute. Everything else is fatal.
///
/// Deliberately absent: the xattr family (reconnaissance surface), keyctl,
/// ptrace, mount/pivot_root (the sandbox must not rearrange its own jail),
/// and the socket family. The network namespace is created empty, so
/// leaving `socket`/`connect` reachable would only re-expose AF_UNIX
/// endpoints the namespace cannot contain.
pub const ALLOWED_SYSCALLS: &[c_long] = &[
    // File and directory operations
    libc::SYS_access,
    libc::SYS_faccessat,
    libc::SYS_chdir,
    libc::SYS_close,
    libc::SYS_dup,
    libc::SYS_dup2,
    libc::SYS_dup3,
    libc::SYS_fchmod,
    libc::SYS_fchmodat,
    libc::SYS_fchown,
    libc::SYS_fchownat,
    libc::SYS_fcntl,
    libc::SYS_fdatasync,
    libc::SYS_fstat,
    libc::SYS_fsync,
    libc::SYS_getcwd,
    libc::SYS_getdents64,
    libc::SYS_lseek,
    libc::SYS_lstat,
    libc::SYS_mkdir,
    libc::SYS_mkdirat,
    libc::SYS_newfstatat,
    libc::SYS_open,
    libc::SYS_openat,
    libc::SYS_openat2,
    libc::SYS_pipe,
    libc::SYS_poll,
    libc::SYS_pread64,
    libc::SYS_pwrite64,
    libc::SYS_read,
    libc::SYS_readlink,
    libc::SYS_readlinkat,
    libc::SYS_readv,
    libc::SYS_rename,
    libc::SYS_renameat,
    libc::SYS_renameat2,
    libc::SYS_rmdir,
    libc::SYS_stat,
    libc::SYS_statx,
    libc::SYS_symlink,
    libc::SYS_symlinkat,
    libc::SYS_unlink,
    libc::SYS_unlinkat,
    libc::SYS_utimensat,
    libc::SYS_write,
    libc::SYS_writev,
    // Process management
    libc::SYS_arch_prctl,
    libc::SYS_clone,
    libc::SYS_execve,
    libc::SYS_execveat,
    libc::SYS_exit,
    libc::SYS_exit_group,
    libc::SYS_fork,
    libc::SYS_getpid,
    libc::SYS_getpgid,
    libc::SYS_getppid,
    libc::SYS_gettid,
    libc::SYS_getuid,
    libc::SYS_geteuid,
    libc::SYS_prctl,
    libc::SYS_setpgid,
    libc::SYS_wait4,
    libc::SYS_waitid,
    // Memory management
    libc::SYS_brk,
    libc::SYS_madvise,
    libc::SYS_mmap,
    libc::SYS_mprotect,
    libc::SYS_mremap,
    libc::SYS_munmap,
    // Time and scheduling
    libc::SYS_clock_gettime,
    libc::SYS_clock_nanosleep,
    libc::SYS_gettimeofday,
    libc::SYS_nanosleep,
    libc::SYS_time,
    libc::SYS_sched_yield,
    // Signals
    libc::SYS_rt_sigaction,
    libc::SYS_rt_sigprocmask,
    libc::SYS_rt_sigreturn,
    libc::SYS_sigaltstack,
    libc::SYS_tgkill,
    libc::SYS_tkill,
    // Resource limits
    libc::SYS_getrlimit,
    libc::SYS_prlimit64,
    libc::SYS_setrlimit,
    // Miscellaneous
    libc::SYS_futex,
    libc::SYS_getrandom,
    libc::SYS_ioctl,
    libc::SYS_set_robust_list,
    libc::SYS_set_tid_address,
    libc::SYS_uname,
    libc::SYS_umask,
];

fn stmt(code: u16, k: u32) -> sock_filter {
    sock_filter {
        code,
        jt: 0,
        jf: 0,
        k,
    }
}

fn jump_eq(k: u32, jt: u8, jf: u8) -> sock_filter {
    sock_filter {
        code: BPF_JMP | BPF_JEQ | BPF_K,
        jt,
        jf,
        k,
    }
}

/// Assembles the whitelist into BPF instructions.
pub fn program() -> Vec<sock_filter> {
    let mut prog = Vec::with_capacity(ALLOWED_SYSCALLS.len() * 2 + 2);
    prog.push(stmt(BPF_LD | BPF_W | BPF_ABS, SECCOMP_DATA_NR_OFFSET));
    for &nr in ALLOWED_SYSCALLS {
        // Equal: fall through to the allow return. Not equal: skip it and
        // test the next entry.
        prog.push(jump_eq(nr as u32, 0, 1));
        prog.push(stmt(BPF_RET | BPF_K, SECCOMP_RET_ALLOW));
    }
    prog.push(stmt(BPF_RET | BPF_K, libc::SECCOMP_RET_KILL_PROCESS));
    prog
}

/// Loads the filter into the kernel. PR_SET_NO_NEW_PRIVS must already be in
/// effect for the calling process.
pub fn install() -> Result<()> {
    let mut filter = program();
    let prog = sock_fprog {
        len: filter.len() as u16,
        filter: filter.as_mut_ptr(),
    };

    let rc = unsafe {
        libc::prctl(
            libc::PR_SET_SECCOMP,
            libc::SECCOMP_MODE_FILTER,
            &prog as *const sock_fprog,
            0,
            0,
        )
    };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINVAL) {
            return Err(SandboxError::KernelFeature {
                feature: "seccomp filter mode",
            });
        }
        return Err(SandboxError::Os {
            op: "install seccomp filter",
            source: err,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn program_has_the_expected_shape() {
        let prog = program();
        assert_eq!(prog.len(), ALLOWED_SYSCALLS.len() * 2 + 2);

        let first = &prog[0];
        assert_eq!(first.code, BPF_LD | BPF_W | BPF_ABS);
        assert_eq!(first.k, SECCOMP_DATA_NR_OFFSET);

        let last = prog.last().unwrap();
        assert_eq!(last.code, BPF_RET | BPF_K);
        assert_eq!(last.k, libc::SECCOMP_RET_KILL_PROCESS);
    }

    #[test]
    fn every_entry_compiles_to_a_test_and_allow_pair() {
        let prog = program();
        for (i, &nr) in ALLOWED_SYSCALLS.iter().enumerate() {
            let test = &prog[1 + i * 2];
            let allow = &prog[2 + i * 2];
            assert_eq!(test.code, BPF_JMP | BPF_JEQ | BPF_K);
            assert_eq!(test.k, nr as u32);
            assert_eq!((test.jt, test.jf), (0, 1));
            assert_eq!(allow.code, BPF_RET | BPF_K);
            assert_eq!(allow.k, SECCOMP_RET_ALLOW);
        }
    }

    #[test]
    fn table_has_no_duplicates() {
        let mut seen = std::collections::HashSet::new();
        for &nr in ALLOWED_SYSCALLS {
            assert!(seen.insert(nr), "duplicate syscall {nr} in allowlist");
        }
    }

    #[test]
    fn network_and_introspection_syscalls_stay_denied() {
        for denied in [
            libc::SYS_socket,
            libc::SYS_connect,
            libc::SYS_sendfile,
            libc::SYS_recvfrom,
            libc::SYS_keyctl,
            libc::SYS_ptrace,
            libc::SYS_mount,
            libc::SYS_pivot_root,
            libc::SYS_getxattr,
        ] {
            assert!(
                !ALLOWED_SYSCALLS.contains(&denied),
                "syscall {denied} must not be whitelisted"
            );
        }
    }
}
