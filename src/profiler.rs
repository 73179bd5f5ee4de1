//! Function call profiling by single-stepping a tracee
//!
//! [`Profiler::run`] launches the tracee, loads its symbol table, steps it to
//! completion while feeding every stop to a [`CallTreeBuilder`], and keeps the
//! finished call tree for display.

use crate::builder::CallTreeBuilder;
use crate::call_tree::CallTree;
use crate::cli::OutputFormat;
use crate::error::Result;
use crate::session::{StepOutcome, TraceSession};
use crate::symbols::SymbolTable;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Symbols whose first instruction starts the visible call tree
pub const DEFAULT_ENTRY_SYMBOLS: [&str; 2] = ["main", "_start"];

/// Settings for one profiling run
#[derive(Debug, Clone)]
pub struct ProfilerConfig {
    pub entry_symbols: Vec<String>,
    pub format: OutputFormat,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            entry_symbols: DEFAULT_ENTRY_SYMBOLS.iter().map(|s| s.to_string()).collect(),
            format: OutputFormat::Text,
        }
    }
}

/// Outcome of a completed profiling run
#[derive(Debug)]
pub struct Profiler {
    tracee: PathBuf,
    tree: CallTree,
    exit: StepOutcome,
    format: OutputFormat,
}

impl Profiler {
    /// Trace `tracee` from launch to exit and build its call tree
    pub fn run(tracee: &Path, config: &ProfilerConfig) -> Result<Self> {
        let mut session = TraceSession::launch(tracee)?;

        let mut symbols = SymbolTable::load(tracee)?;
        symbols.relocate_for(session.pid(), tracee)?;
        if !config
            .entry_symbols
            .iter()
            .any(|entry| symbols.contains_name(entry))
        {
            warn!(
                "none of the entry symbols {:?} exist in {}",
                config.entry_symbols,
                tracee.display()
            );
        }

        let mut builder = CallTreeBuilder::new(&symbols, config.entry_symbols.iter().cloned());
        let mut steps: u64 = 0;

        let exit = loop {
            match session.step()? {
                StepOutcome::Stopped(regs) => {
                    steps += 1;
                    let ip = regs.instruction_pointer();
                    builder.observe(ip, || session.read_instruction_word(ip))?;
                }
                outcome => break outcome,
            }
        };

        debug!(
            steps,
            entry_reached = builder.entry_reached(),
            "trace of {} finished",
            tracee.display()
        );

        Ok(Self {
            tracee: tracee.to_path_buf(),
            tree: builder.finish(),
            exit,
            format: config.format,
        })
    }

    pub fn tracee(&self) -> &Path {
        &self.tracee
    }

    pub fn tree(&self) -> &CallTree {
        &self.tree
    }

    /// How the tracee terminated
    pub fn exit(&self) -> StepOutcome {
        self.exit
    }

    /// Write the call tree in the configured format
    ///
    /// Nothing is written when tracing never reached an entry symbol.
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        match self.format {
            OutputFormat::Text => self.tree.render(out),
            OutputFormat::Json => match self.tree.to_report() {
                Some(report) => {
                    serde_json::to_writer_pretty(&mut *out, &report)?;
                    writeln!(out)
                }
                None => Ok(()),
            },
        }
    }

    /// Write the call tree to stdout
    pub fn display(&self) -> io::Result<()> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        self.write_to(&mut out)?;
        out.flush()
    }
}
