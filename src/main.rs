use anyhow::{Context, Result};
use calltrace::cli::{Cli, Mode};
use calltrace::profiler::{Profiler, ProfilerConfig};
use calltrace::session::StepOutcome;
use calltrace::syscall_trace;
use clap::Parser;
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Build the call tree of the tracee and print it
fn run_profiler(tracee: &Path, config: ProfilerConfig) -> Result<()> {
    let profiler = Profiler::run(tracee, &config)
        .with_context(|| format!("Failed to profile {}", tracee.display()))?;
    profiler
        .display()
        .context("Failed to write call tree to stdout")?;

    if let StepOutcome::Signaled(sig) = profiler.exit() {
        eprintln!(
            "{} killed by signal: {:?}",
            profiler.tracee().display(),
            sig
        );
    }
    Ok(())
}

/// Print the tracee's syscalls and exit with its status
fn run_syscall_mode(tracee: &Path) -> Result<()> {
    let stdout = std::io::stdout();
    let outcome = syscall_trace::trace_syscalls(tracee, &mut stdout.lock())
        .with_context(|| format!("Failed to trace syscalls of {}", tracee.display()))?;

    let exit_code = match outcome {
        StepOutcome::Exited(code) => code,
        StepOutcome::Signaled(sig) => {
            eprintln!("Child killed by signal: {:?}", sig);
            128 + sig as i32
        }
        StepOutcome::Stopped(_) => 0,
    };

    // Exit with traced program's exit code
    std::process::exit(exit_code);
}

fn main() -> Result<()> {
    let args = Cli::parse();

    // Initialize tracing if --debug flag is set
    init_tracing(args.debug);

    match args.mode {
        Mode::Profiler => {
            let config = ProfilerConfig {
                entry_symbols: args.entry_symbols,
                format: args.format,
            };
            run_profiler(&args.tracee, config)
        }
        Mode::Syscall => run_syscall_mode(&args.tracee),
    }
}
