// Percentages intentionally lose precision for display purposes
#![allow(clippy::cast_precision_loss)]

use std::fmt::Write as _;

use super::diagnostics::DispatchStats;
use crate::analysis::FunctionHotspot;
use crate::classification::{FilterDiagnostics, FrameOrigin};
use crate::trace_data::{ResolutionMode, ResolvedStack, TimelineMarker, TraceOutput};

/// Format a resolved stack as an indented block, innermost first
#[must_use]
pub fn format_stack(stack: &ResolvedStack) -> String {
    let mode = match stack.mode {
        ResolutionMode::Instrumented => "CAPTURE",
        ResolutionMode::Sampled => "SAMPLE",
    };

    let mut out = format!("[{mode}] {}", stack.thread_id);
    if let Some(ref label) = stack.label {
        let _ = write!(out, " label={label:?}");
    }
    if let Some(ts) = stack.timestamp {
        let _ = write!(out, " at={ts}");
    }

    if stack.frames.is_empty() {
        out.push_str("\n   (no script frames)");
    }
    for (i, frame) in stack.frames.iter().enumerate() {
        let _ = write!(out, "\n   #{i:<2} {frame}");
    }
    out
}

/// Format a timeline marker as a single line
#[must_use]
pub fn format_marker(marker: &TimelineMarker) -> String {
    let mut out = format!("[MARK] {} {:?} kind={:?}", marker.thread_id, marker.label, marker.kind);
    if let Some(ts) = marker.timestamp {
        let _ = write!(out, " at={ts}");
    }
    out
}

/// Display a dispatcher output in headless mode
pub fn display_output(output: &TraceOutput) {
    match output {
        TraceOutput::Stack(stack) => println!("{}", format_stack(stack)),
        TraceOutput::Marker(marker) => println!("{}", format_marker(marker)),
    }
}

/// Display dispatcher statistics
pub fn display_statistics(stats: &DispatchStats, filter: &FilterDiagnostics) {
    eprintln!(
        "stats: events={} stacks={} (empty={}) markers={} malformed={}",
        stats.events, stats.stacks_emitted, stats.empty_stacks, stats.markers_emitted, stats.malformed
    );
    eprintln!(
        "anomalies: unknown_module={} stack_mismatch={} unresolved_ids={} native_frames={}",
        stats.unknown_module, stats.stack_mismatch, stats.unresolved_ids, stats.unresolved_addresses
    );
    eprintln!(
        "frames: script={} ignored={} not_included={} no_source={} ({:.1}% script)",
        filter.count(FrameOrigin::Script),
        filter.count(FrameOrigin::Ignored),
        filter.count(FrameOrigin::NotIncluded),
        filter.count(FrameOrigin::NoSource),
        filter.script_coverage()
    );
    if stats.channel_dropped > 0 {
        eprintln!("warning: {} outputs dropped by a slow consumer", stats.channel_dropped);
    }
}

/// Format the hotspot summary table
#[must_use]
pub fn format_hotspots(hotspots: &[FunctionHotspot], total: u64) -> String {
    let mut out = format!("HOTSPOTS ({total} stacks)\n{}", "─".repeat(33));
    if hotspots.is_empty() {
        out.push_str("\n  (no script frames captured)");
    }

    for hotspot in hotspots {
        let _ = write!(
            out,
            "\n  {:<28} {:>5.1}%  {} stacks on {} thread(s)",
            hotspot.name,
            hotspot.percentage,
            hotspot.count,
            hotspot.threads.len()
        );
        for stack in &hotspot.call_stacks {
            let _ = write!(out, "\n      {}", stack.join(" <- "));
        }
    }
    out
}

/// Display the hotspot summary
pub fn display_hotspots(hotspots: &[FunctionHotspot], total: u64) {
    println!("{}", format_hotspots(hotspots, total));
}
