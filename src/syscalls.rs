//! Syscall number to name mapping for x86-64

use std::borrow::Cow;

/// `(number, name)` pairs, sorted by number
const SYSCALL_TABLE: &[(i64, &str)] = &[
    (0, "read"),
    (1, "write"),
    (2, "open"),
    (3, "close"),
    (4, "stat"),
    (5, "fstat"),
    (6, "lstat"),
    (7, "poll"),
    (8, "lseek"),
    (9, "mmap"),
    (10, "mprotect"),
    (11, "munmap"),
    (12, "brk"),
    (13, "rt_sigaction"),
    (14, "rt_sigprocmask"),
    (15, "rt_sigreturn"),
    (16, "ioctl"),
    (17, "pread64"),
    (18, "pwrite64"),
    (19, "readv"),
    (20, "writev"),
    (21, "access"),
    (22, "pipe"),
    (23, "select"),
    (24, "sched_yield"),
    (25, "mremap"),
    (26, "msync"),
    (27, "mincore"),
    (28, "madvise"),
    (32, "dup"),
    (33, "dup2"),
    (34, "pause"),
    (35, "nanosleep"),
    (39, "getpid"),
    (41, "socket"),
    (42, "connect"),
    (56, "clone"),
    (57, "fork"),
    (58, "vfork"),
    (59, "execve"),
    (60, "exit"),
    (61, "wait4"),
    (62, "kill"),
    (63, "uname"),
    (72, "fcntl"),
    (79, "getcwd"),
    (80, "chdir"),
    (89, "readlink"),
    (96, "gettimeofday"),
    (97, "getrlimit"),
    (99, "sysinfo"),
    (102, "getuid"),
    (104, "getgid"),
    (107, "geteuid"),
    (108, "getegid"),
    (110, "getppid"),
    (131, "sigaltstack"),
    (157, "prctl"),
    (158, "arch_prctl"),
    (186, "gettid"),
    (202, "futex"),
    (217, "getdents64"),
    (218, "set_tid_address"),
    (228, "clock_gettime"),
    (230, "clock_nanosleep"),
    (231, "exit_group"),
    (257, "openat"),
    (262, "newfstatat"),
    (273, "set_robust_list"),
    (302, "prlimit64"),
    (318, "getrandom"),
    (332, "statx"),
    (334, "rseq"),
    (435, "clone3"),
];

/// Resolve a syscall number to its name
pub fn syscall_name(num: i64) -> Option<&'static str> {
    SYSCALL_TABLE
        .binary_search_by_key(&num, |&(n, _)| n)
        .ok()
        .map(|idx| SYSCALL_TABLE[idx].1)
}

/// Name for display: the known name, or `syscall_<n>`
pub fn display_name(num: i64) -> Cow<'static, str> {
    syscall_name(num).map_or_else(|| Cow::Owned(format!("syscall_{num}")), Cow::Borrowed)
}
