//! Error types for tracing sessions
//!
//! Every variant except an unresolved symbol is fatal to the trace. Unresolved
//! symbols are not errors at all: the call tree records them as
//! [`FrameName::Unknown`](crate::call_tree::FrameName::Unknown).

use nix::errno::Errno;
use nix::unistd::Pid;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while launching or tracing a child process
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("Tracee not found: {}", .0.display())]
    TraceeNotFound(PathBuf),

    #[error("Failed to launch {}: {reason}", .path.display())]
    Launch { path: PathBuf, reason: String },

    #[error("Failed to load symbol table from {}: {reason}", .path.display())]
    SymbolTable { path: PathBuf, reason: String },

    #[error("Failed to fetch registers of process {pid}: {source}")]
    Registers { pid: Pid, source: Errno },

    #[error("Failed to read instruction at {address:#x}: {source}")]
    ReadMemory { address: u64, source: Errno },

    #[error("ptrace {operation} failed for process {pid}: {source}")]
    Ptrace {
        operation: &'static str,
        pid: Pid,
        source: Errno,
    },
}

/// Result type for tracing operations
pub type Result<T> = std::result::Result<T, TraceError>;
