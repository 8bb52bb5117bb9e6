//! Trace export functionality
//!
//! Report sinks for dispatcher output:
//! - Chrome Trace Event Format, for visualization in chrome://tracing or Perfetto
//! - JSON lines, one output record per line, for further processing

pub mod chrome_trace;
pub mod jsonl;

pub use chrome_trace::ChromeTraceExporter;
pub use jsonl::JsonLinesWriter;
