//! Syscall mode: report every system call the tracee makes
//!
//! Uses the same [`TraceSession`] as the profiler, resuming with
//! `PTRACE_SYSCALL` instead of single-stepping. Entry and exit stops
//! alternate; each completed call is printed as
//! `name(arg1, arg2, arg3) = result`.

use crate::session::{Registers, StepOutcome, TraceSession};
use crate::syscalls;
use std::io::Write;
use std::path::Path;

/// Syscall recorded at its entry stop
#[derive(Debug, Clone, PartialEq, Eq)]
struct SyscallEntry {
    number: i64,
    args: [u64; 3],
}

impl SyscallEntry {
    fn from_registers(regs: &Registers) -> Self {
        Self {
            number: regs.syscall_number(),
            args: regs.syscall_args(),
        }
    }

    fn format_call(&self) -> String {
        let [a, b, c] = self.args;
        format!(
            "{}({:#x}, {:#x}, {:#x})",
            syscalls::display_name(self.number),
            a,
            b,
            c
        )
    }
}

/// Trace the syscalls of `tracee`, writing one line per call to `out`
///
/// Returns how the tracee terminated.
pub fn trace_syscalls<W: Write>(tracee: &Path, out: &mut W) -> anyhow::Result<StepOutcome> {
    let mut session = TraceSession::launch(tracee)?;
    let outcome = run(&mut session, out)?;
    out.flush()?;
    Ok(outcome)
}

fn run<W: Write>(session: &mut TraceSession, out: &mut W) -> anyhow::Result<StepOutcome> {
    let mut in_flight: Option<SyscallEntry> = None;

    loop {
        let regs = match session.next_syscall()? {
            StepOutcome::Stopped(regs) => regs,
            outcome => {
                // exit/exit_group never return
                if let Some(entry) = in_flight.take() {
                    writeln!(out, "{} = ?", entry.format_call())?;
                }
                return Ok(outcome);
            }
        };

        match in_flight.take() {
            None => in_flight = Some(SyscallEntry::from_registers(&regs)),
            Some(entry) => writeln!(out, "{} = {}", entry.format_call(), regs.return_value())?,
        }
    }
}
