//! calltrace - single-stepping function call tracer
//!
//! Launches a program under ptrace, executes it one instruction at a time,
//! and reconstructs its call tree from the call and return opcodes it
//! executes. Every node carries the number of instructions executed by that
//! invocation (descendants included) and how many direct recursive calls
//! were folded into it.
//!
//! ```no_run
//! use calltrace::profiler::{Profiler, ProfilerConfig};
//! use std::path::Path;
//!
//! let profiler = Profiler::run(Path::new("./a.out"), &ProfilerConfig::default())?;
//! profiler.display()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod builder;
pub mod call_tree;
pub mod cli;
pub mod error;
pub mod isa;
pub mod profiler;
pub mod session;
pub mod symbols;
pub mod syscall_trace;
pub mod syscalls;

pub use error::{Result, TraceError};
