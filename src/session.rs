//! Tracee lifecycle via ptrace
//!
//! A [`TraceSession`] forks the target, has the child request tracing with
//! `PTRACE_TRACEME` before exec, and then hands out one stop at a time. The
//! session is the only place that issues ptrace requests.

use crate::error::{Result, TraceError};
use nix::errno::Errno;
use nix::sys::ptrace;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, trace};

/// Register snapshot of a stopped tracee (x86-64)
#[derive(Clone, Copy)]
pub struct Registers(libc::user_regs_struct);

impl std::fmt::Debug for Registers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registers")
            .field("rip", &format_args!("{:#x}", self.0.rip))
            .field("rsp", &format_args!("{:#x}", self.0.rsp))
            .field("orig_rax", &self.0.orig_rax)
            .finish()
    }
}

impl Registers {
    pub fn instruction_pointer(&self) -> u64 {
        self.0.rip
    }

    /// Syscall number at a syscall-entry stop
    pub fn syscall_number(&self) -> i64 {
        self.0.orig_rax as i64
    }

    /// First three syscall arguments (rdi, rsi, rdx)
    pub fn syscall_args(&self) -> [u64; 3] {
        [self.0.rdi, self.0.rsi, self.0.rdx]
    }

    /// Syscall return value at a syscall-exit stop
    pub fn return_value(&self) -> i64 {
        self.0.rax as i64
    }
}

/// Result of resuming the tracee
#[derive(Debug, Clone, Copy)]
pub enum StepOutcome {
    /// The tracee exited normally with this status
    Exited(i32),
    /// The tracee was terminated by a signal
    Signaled(Signal),
    /// The tracee stopped; registers describe the next instruction
    Stopped(Registers),
}

/// An exec'd child under ptrace control
#[derive(Debug)]
pub struct TraceSession {
    pid: Pid,
    tracee: PathBuf,
    /// The exec stop has not been handed out yet
    at_exec_stop: bool,
    finished: bool,
    pending_signal: Option<Signal>,
}

impl TraceSession {
    /// Fork and exec `tracee` with tracing enabled and stdout discarded
    ///
    /// Returns once the child is stopped on the first instruction of the new
    /// image.
    pub fn launch(tracee: &Path) -> Result<Self> {
        if !tracee.is_file() {
            return Err(TraceError::TraceeNotFound(tracee.to_path_buf()));
        }

        let launch_error = |reason: String| TraceError::Launch {
            path: tracee.to_path_buf(),
            reason,
        };
        let program = exec_path(tracee);

        // Fork: parent will trace, child will exec
        match unsafe { fork() }.map_err(|e| launch_error(format!("fork failed: {e}")))? {
            ForkResult::Parent { child } => {
                debug!("forked tracee {} as pid={}", tracee.display(), child);
                let mut session = Self {
                    pid: child,
                    tracee: tracee.to_path_buf(),
                    at_exec_stop: true,
                    finished: false,
                    pending_signal: None,
                };

                // Wait for the SIGTRAP delivered on exec under PTRACE_TRACEME
                match waitpid(child, None).map_err(|e| launch_error(format!("waitpid: {e}")))? {
                    WaitStatus::Stopped(_, Signal::SIGTRAP) => {}
                    WaitStatus::Exited(_, code) => {
                        session.finished = true;
                        return Err(launch_error(format!("exec failed (exit status {code})")));
                    }
                    other => {
                        return Err(launch_error(format!("unexpected initial stop: {other:?}")));
                    }
                }

                ptrace::setoptions(
                    child,
                    ptrace::Options::PTRACE_O_EXITKILL | ptrace::Options::PTRACE_O_TRACESYSGOOD,
                )
                .map_err(|e| launch_error(format!("failed to set ptrace options: {e}")))?;

                Ok(session)
            }
            ForkResult::Child => {
                // Child: allow tracing and exec target program
                if ptrace::traceme().is_err() {
                    std::process::exit(127);
                }

                let err = Command::new(&program)
                    .env_clear()
                    .stdout(Stdio::null())
                    .exec();

                // If we get here, exec failed
                eprintln!("Failed to exec {}: {}", tracee.display(), err);
                std::process::exit(127);
            }
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn tracee(&self) -> &Path {
        &self.tracee
    }

    /// Execute one instruction and wait for the next stop
    ///
    /// The first call reports the exec stop itself without stepping, so the
    /// entry instruction of the image is observed too.
    pub fn step(&mut self) -> Result<StepOutcome> {
        if std::mem::take(&mut self.at_exec_stop) {
            return self.registers().map(StepOutcome::Stopped);
        }

        loop {
            let signal = self.pending_signal.take();
            ptrace::step(self.pid, signal).map_err(|e| self.ptrace_error("singlestep", e))?;

            match self.wait()? {
                WaitStatus::Stopped(_, Signal::SIGTRAP) => {
                    return self.registers().map(StepOutcome::Stopped);
                }
                WaitStatus::Stopped(_, sig) => {
                    trace!("re-injecting {:?} into pid={}", sig, self.pid);
                    self.pending_signal = Some(sig);
                }
                WaitStatus::Exited(_, code) => return Ok(self.exited(code)),
                WaitStatus::Signaled(_, sig, _) => return Ok(self.signaled(sig)),
                _ => {}
            }
        }
    }

    /// Run to the next syscall entry or exit stop
    pub fn next_syscall(&mut self) -> Result<StepOutcome> {
        self.at_exec_stop = false;

        loop {
            let signal = self.pending_signal.take();
            ptrace::syscall(self.pid, signal).map_err(|e| self.ptrace_error("syscall", e))?;

            match self.wait()? {
                WaitStatus::PtraceSyscall(_) => return self.registers().map(StepOutcome::Stopped),
                WaitStatus::Stopped(_, Signal::SIGTRAP) => {}
                WaitStatus::Stopped(_, sig) => {
                    trace!("re-injecting {:?} into pid={}", sig, self.pid);
                    self.pending_signal = Some(sig);
                }
                WaitStatus::Exited(_, code) => return Ok(self.exited(code)),
                WaitStatus::Signaled(_, sig, _) => return Ok(self.signaled(sig)),
                _ => {}
            }
        }
    }

    /// Read the machine word at `address` in the tracee's text
    pub fn read_instruction_word(&self, address: u64) -> Result<u64> {
        ptrace::read(self.pid, address as ptrace::AddressType)
            .map(|word| word as u64)
            .map_err(|source| TraceError::ReadMemory { address, source })
    }

    fn registers(&self) -> Result<Registers> {
        ptrace::getregs(self.pid)
            .map(Registers)
            .map_err(|source| TraceError::Registers {
                pid: self.pid,
                source,
            })
    }

    fn wait(&self) -> Result<WaitStatus> {
        waitpid(self.pid, None).map_err(|e| self.ptrace_error("waitpid", e))
    }

    fn exited(&mut self, code: i32) -> StepOutcome {
        debug!("pid={} exited with status {}", self.pid, code);
        self.finished = true;
        StepOutcome::Exited(code)
    }

    fn signaled(&mut self, sig: Signal) -> StepOutcome {
        debug!("pid={} killed by {:?}", self.pid, sig);
        self.finished = true;
        StepOutcome::Signaled(sig)
    }

    fn ptrace_error(&self, operation: &'static str, source: Errno) -> TraceError {
        TraceError::Ptrace {
            operation,
            pid: self.pid,
            source,
        }
    }
}

/// Path handed to exec, never subject to a `PATH` search
///
/// A bare name like `prog` refers to the file in the current directory, the
/// same file the symbol table is loaded from.
fn exec_path(tracee: &Path) -> PathBuf {
    if tracee.components().count() == 1 && tracee.is_relative() {
        Path::new(".").join(tracee)
    } else {
        tracee.to_path_buf()
    }
}

impl Drop for TraceSession {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        debug!("killing unfinished tracee pid={}", self.pid);
        let _ = kill(self.pid, Signal::SIGKILL);
        let _ = waitpid(self.pid, None);
    }
}
