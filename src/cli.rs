//! CLI argument parsing for calltrace

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// What to trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Single-step the tracee and print its function call tree (default)
    Profiler,
    /// Print every system call made by the tracee
    Syscall,
}

/// Output format for the call tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Indented text, one call per line (default)
    Text,
    /// JSON format for machine parsing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "calltrace")]
#[command(version)]
#[command(about = "Function call tracer with per-call instruction counts", long_about = None)]
pub struct Cli {
    /// Tracing mode
    #[arg(short, long, value_enum, default_value = "profiler")]
    pub mode: Mode,

    /// Output format of the call tree (profiler mode)
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Symbols that start the visible call tree (profiler mode)
    #[arg(
        long = "entry",
        value_name = "SYMBOL",
        value_delimiter = ',',
        default_value = "main,_start"
    )]
    pub entry_symbols: Vec<String>,

    /// Enable debug tracing output on stderr
    #[arg(long)]
    pub debug: bool,

    /// Executable to launch and trace
    #[arg(value_name = "TRACEE")]
    pub tracee: PathBuf,
}
