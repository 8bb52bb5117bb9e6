//! CLI argument definitions

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::classification::FilterConfig;

/// How resolved outputs are written to stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable stack blocks
    #[default]
    Text,
    /// One JSON object per line
    Jsonl,
    /// Nothing (use with --export or --summary)
    None,
}

#[derive(Debug, Parser)]
#[command(
    name = "etwstack",
    version,
    about = "Rebuild script call stacks from a decoded trace event stream",
    after_help = "\
EXAMPLES:
    etwstack events.jsonl                          Print every resolved stack
    etwstack events.jsonl --summary --format none  Hotspot summary only
    decoder trace.etl | etwstack --format jsonl    Read events from stdin
    etwstack events.jsonl --export trace.json      Chrome trace for Perfetto
    etwstack --include src/ --ignore src/vendored.py events.jsonl"
)]
pub struct Args {
    /// Decoded event stream, one JSON record per line ("-" or omitted = stdin)
    #[arg(value_name = "EVENTS")]
    pub input: Option<PathBuf>,

    /// Output format for resolved stacks and marks
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Export a Chrome trace to file (for chrome://tracing or Perfetto)
    #[arg(long, value_name = "FILE")]
    pub export: Option<PathBuf>,

    /// Process id written into the exported trace
    #[arg(long, default_value = "0", requires = "export")]
    pub pid: u32,

    /// Print a hotspot summary after the stream ends
    #[arg(long)]
    pub summary: bool,

    /// Never report frames from this file (repeatable)
    #[arg(long, value_name = "FILE", env = "ETWSTACK_IGNORE", value_delimiter = ';')]
    pub ignore: Vec<String>,

    /// Only report frames from files under this prefix (repeatable)
    #[arg(long, value_name = "PREFIX", env = "ETWSTACK_INCLUDE", value_delimiter = ';')]
    pub include: Vec<String>,

    /// Tracer or thread-library file to hide from stacks (repeatable)
    #[arg(long, value_name = "FILE")]
    pub infrastructure: Vec<String>,

    /// Do not print stacks that have no script frames
    #[arg(long)]
    pub skip_empty: bool,

    /// Print engine and filter configuration, then exit
    #[arg(long)]
    pub info: bool,

    /// Suppress statistics on stderr
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Filter rules from the command line and environment
    #[must_use]
    pub fn filter_config(&self) -> FilterConfig {
        FilterConfig {
            ignore_files: self.ignore.clone(),
            include_prefixes: self.include.clone(),
            infrastructure_files: self.infrastructure.clone(),
        }
    }

    /// Input path, or `None` for stdin
    #[must_use]
    pub fn input_path(&self) -> Option<&PathBuf> {
        self.input.as_ref().filter(|p| p.as_os_str() != "-")
    }
}
