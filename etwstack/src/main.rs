//! # etwstack - Main Entry Point
//!
//! Replays a decoded trace event stream through the correlation engine:
//! - **Text** (default): print each resolved stack and mark
//! - **JSON lines** (`--format jsonl`): one output record per line
//! - **Export** (`--export trace.json`): Chrome trace for Perfetto
//! - **Summary** (`--summary`): hotspots by innermost script frame

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};

use etwstack::analysis::HotspotStats;
use etwstack::classification::FrameFilter;
use etwstack::cli::{Args, OutputFormat};
use etwstack::domain::{ExportError, InputError};
use etwstack::export::{ChromeTraceExporter, JsonLinesWriter};
use etwstack::profiling::{
    display_hotspots, display_output, display_statistics, technical_info, EventDispatcher,
};
use etwstack::trace_data::TraceOutput;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<InputError>().is_some() {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

fn open_input(args: &Args) -> Result<Box<dyn BufRead>> {
    match args.input_path() {
        Some(path) => {
            let file = File::open(path)
                .map_err(|e| InputError::ReadFailed(format!("{}: {e}", path.display())))?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(io::stdin().lock())),
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    let config = args.filter_config();

    if args.info {
        println!("{}", technical_info(&config));
        return Ok(());
    }

    let input = open_input(&args)?;

    let mut dispatcher = EventDispatcher::new(FrameFilter::from_config(&config));
    if args.export.is_some() {
        let mut exporter = ChromeTraceExporter::new();
        exporter.set_process_id(args.pid);
        dispatcher = dispatcher.with_exporter(exporter);
    }

    let stdout = io::stdout();
    let mut jsonl = (args.format == OutputFormat::Jsonl).then(|| JsonLinesWriter::new(BufWriter::new(stdout.lock())));
    let mut hotspots = args.summary.then(HotspotStats::new);
    let mut write_error: Option<ExportError> = None;

    let processed = dispatcher
        .replay(input, |output| {
            if let (Some(stats), TraceOutput::Stack(stack)) = (hotspots.as_mut(), output) {
                stats.record_stack(stack);
            }
            if args.skip_empty && output.as_stack().is_some_and(|s| s.is_empty()) {
                return;
            }
            match (args.format, jsonl.as_mut()) {
                (OutputFormat::Jsonl, Some(writer)) if write_error.is_none() => {
                    if let Err(e) = writer.write(output) {
                        write_error = Some(e);
                    }
                }
                (OutputFormat::Text, _) => display_output(output),
                _ => {}
            }
        })
        .context("Failed to read event stream")?;

    if let Some(mut writer) = jsonl {
        writer.flush().context("Failed to write output")?;
    }
    if let Some(e) = write_error {
        return Err(e).context("Failed to write output");
    }
    info!("Processed {processed} events");

    if let Some(stats) = hotspots {
        display_hotspots(&stats.to_hotspots(), stats.total_samples());
    }

    if !args.quiet {
        display_statistics(dispatcher.stats(), dispatcher.filter().diagnostics());
    }

    // Export trace if enabled
    if let (Some(exporter), Some(export_path)) = (dispatcher.take_exporter(), args.export.as_ref()) {
        let file = File::create(export_path).context("Failed to create trace output file")?;
        let mut writer = BufWriter::new(file);
        exporter.export(&mut writer).context("Failed to export trace")?;
        writer.flush().context("Failed to export trace")?;

        if !args.quiet {
            eprintln!("saved: {}", export_path.display());
        }
    }

    io::stdout().flush().ok();
    Ok(())
}
