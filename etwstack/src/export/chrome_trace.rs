use etwstack_common::MarkKind;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::io::Write;

use crate::domain::{ExportError, ThreadId};
use crate::trace_data::{ResolvedStack, TimelineMarker, TraceOutput};

/// Chrome Trace Event format
/// Spec: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU/preview
#[derive(Debug, Clone, Serialize)]
struct ChromeTraceEvent {
    /// Event name (innermost frame or mark label)
    name: String,
    /// Category for filtering/coloring
    cat: String,
    /// Phase: "B" = begin, "E" = end, "i" = instant, "M" = metadata
    ph: String,
    /// Timestamp in microseconds
    ts: f64,
    /// Process ID
    pid: u32,
    /// Thread ID
    tid: u32,
    /// Instant event scope ("t" = thread)
    #[serde(skip_serializing_if = "Option::is_none")]
    s: Option<String>,
    /// Optional arguments (metadata)
    #[serde(skip_serializing_if = "Option::is_none")]
    args: Option<HashMap<String, JsonValue>>,
}

/// Chrome Trace Format container
#[derive(Debug, Serialize)]
struct ChromeTrace {
    #[serde(rename = "traceEvents")]
    trace_events: Vec<ChromeTraceEvent>,
    #[serde(rename = "displayTimeUnit")]
    display_time_unit: String,
}

/// Name shown for a stack whose frames were all filtered out
const EMPTY_STACK_NAME: &str = "(no script frames)";

/// Chrome trace exporter for timeline visualization
///
/// Outputs with a transport timestamp are placed relative to the first
/// timestamp seen. Outputs without one (streams whose decoder dropped
/// timestamps) are placed 1µs apart in arrival order.
#[derive(Debug, Default)]
pub struct ChromeTraceExporter {
    /// Collected trace events
    events: Vec<ChromeTraceEvent>,
    /// Process the traced threads belong to
    pid: u32,
    /// Start timestamp for relative timing (in nanoseconds)
    start_timestamp_ns: Option<u64>,
    /// Arrival counter for untimed outputs
    ordinal: u64,
    /// Threads seen, for thread-name metadata
    threads: BTreeMap<u32, usize>,
}

impl ChromeTraceExporter {
    /// Create a new Chrome trace exporter
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the process id written on every event
    pub fn set_process_id(&mut self, pid: u32) {
        self.pid = pid;
    }

    /// Add a dispatcher output to the trace
    pub fn add_output(&mut self, output: &TraceOutput) {
        let ts = self.relative_micros(output);
        *self.threads.entry(output.thread_id().0).or_default() += 1;

        match output {
            TraceOutput::Stack(stack) => self.add_stack(stack, ts),
            TraceOutput::Marker(marker) => self.add_marker(marker, ts),
        }
    }

    fn add_stack(&mut self, stack: &ResolvedStack, ts: f64) {
        let mut args = HashMap::new();
        args.insert("frames".to_string(), serde_json::json!(stack.frames));
        args.insert("mode".to_string(), serde_json::json!(stack.mode));
        if let Some(ref label) = stack.label {
            args.insert("label".to_string(), serde_json::json!(label));
        }

        self.events.push(ChromeTraceEvent {
            name: stack.innermost().unwrap_or(EMPTY_STACK_NAME).to_string(),
            cat: "stack".to_string(),
            ph: "i".to_string(),
            ts,
            pid: self.pid,
            tid: stack.thread_id.0,
            s: Some("t".to_string()),
            args: Some(args),
        });
    }

    fn add_marker(&mut self, marker: &TimelineMarker, ts: f64) {
        let (ph, scope) = match marker.kind {
            MarkKind::RangeBegin => ("B", None),
            MarkKind::RangeEnd => ("E", None),
            // Stack captures arrive as stacks; treat a stray one like a point
            MarkKind::Point | MarkKind::StackCapture => ("i", Some("t".to_string())),
        };

        self.events.push(ChromeTraceEvent {
            name: marker.label.clone(),
            cat: "mark".to_string(),
            ph: ph.to_string(),
            ts,
            pid: self.pid,
            tid: marker.thread_id.0,
            s: scope,
            args: None,
        });
    }

    #[allow(clippy::cast_precision_loss)]
    fn relative_micros(&mut self, output: &TraceOutput) -> f64 {
        self.ordinal += 1;
        let Some(timestamp) = output.timestamp() else {
            return self.ordinal as f64;
        };

        let start = *self.start_timestamp_ns.get_or_insert(timestamp.0);
        timestamp.0.saturating_sub(start) as f64 / 1000.0
    }

    /// Export the trace to any writer (file, stdout, buffer, etc.)
    ///
    /// # Example
    /// ```
    /// use etwstack::export::ChromeTraceExporter;
    ///
    /// # fn example() -> anyhow::Result<()> {
    /// let exporter = ChromeTraceExporter::new();
    ///
    /// // Write to buffer for testing
    /// let mut buffer = Vec::new();
    /// exporter.export(&mut buffer)?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    /// Returns an error if the trace cannot be serialized or written
    pub fn export<W: Write>(&self, writer: W) -> Result<(), ExportError> {
        let mut all_events = self.events.clone();

        // Thread name metadata events
        for (&tid, &count) in &self.threads {
            let mut args = HashMap::new();
            args.insert("name".to_string(), serde_json::json!(ThreadId(tid).to_string()));
            args.insert("outputs".to_string(), serde_json::json!(count));

            all_events.push(ChromeTraceEvent {
                name: "thread_name".to_string(),
                cat: String::new(),
                ph: "M".to_string(),
                ts: 0.0,
                pid: self.pid,
                tid,
                s: None,
                args: Some(args),
            });
        }

        let trace = ChromeTrace { trace_events: all_events, display_time_unit: "ms".to_string() };
        serde_json::to_writer_pretty(writer, &trace)?;
        Ok(())
    }

    /// Get the number of events collected
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Timestamp;
    use crate::trace_data::ResolutionMode;

    fn export_json(exporter: &ChromeTraceExporter) -> serde_json::Value {
        let mut buffer = Vec::new();
        exporter.export(&mut buffer).unwrap();
        serde_json::from_slice(&buffer).unwrap()
    }

    fn marker(label: &str, kind: MarkKind, ts: Option<u64>) -> TraceOutput {
        TraceOutput::Marker(TimelineMarker {
            thread_id: ThreadId(1),
            label: label.to_string(),
            kind,
            timestamp: ts.map(Timestamp),
        })
    }

    #[test]
    fn test_stack_becomes_instant_with_frames() {
        let mut exporter = ChromeTraceExporter::new();
        exporter.add_output(&TraceOutput::Stack(ResolvedStack {
            thread_id: ThreadId(3),
            frames: vec!["b".to_string(), "a".to_string()],
            mode: ResolutionMode::Instrumented,
            label: Some("here".to_string()),
            timestamp: None,
        }));

        let json = export_json(&exporter);
        let event = &json["traceEvents"][0];
        assert_eq!(event["ph"], "i");
        assert_eq!(event["name"], "b");
        assert_eq!(event["tid"], 3);
        assert_eq!(event["args"]["frames"][1], "a");
        assert_eq!(event["args"]["label"], "here");
        assert_eq!(event["args"]["mode"], "instrumented");
    }

    #[test]
    fn test_range_marks_pair_up() {
        let mut exporter = ChromeTraceExporter::new();
        exporter.add_output(&marker("load", MarkKind::RangeBegin, Some(5_000)));
        exporter.add_output(&marker("tick", MarkKind::Point, Some(6_000)));
        exporter.add_output(&marker("load", MarkKind::RangeEnd, Some(9_000)));

        let json = export_json(&exporter);
        let events = json["traceEvents"].as_array().unwrap();
        assert_eq!(events[0]["ph"], "B");
        assert_eq!(events[0]["ts"], 0.0);
        assert_eq!(events[1]["ph"], "i");
        assert_eq!(events[1]["ts"], 1.0);
        assert_eq!(events[2]["ph"], "E");
        assert_eq!(events[2]["ts"], 4.0);

        // Plus one thread_name metadata event
        assert_eq!(events.len(), 4);
        assert_eq!(events[3]["ph"], "M");
        assert_eq!(events[3]["args"]["name"], "TID:1");
    }

    #[test]
    fn test_untimed_outputs_use_arrival_order() {
        let mut exporter = ChromeTraceExporter::new();
        exporter.set_process_id(42);
        exporter.add_output(&marker("a", MarkKind::Point, None));
        exporter.add_output(&marker("b", MarkKind::Point, None));

        let json = export_json(&exporter);
        assert_eq!(json["traceEvents"][0]["ts"], 1.0);
        assert_eq!(json["traceEvents"][1]["ts"], 2.0);
        assert_eq!(json["traceEvents"][1]["pid"], 42);
        assert_eq!(exporter.event_count(), 2);
    }

    #[test]
    fn test_empty_stack_has_placeholder_name() {
        let mut exporter = ChromeTraceExporter::new();
        exporter.add_output(&TraceOutput::Stack(ResolvedStack {
            thread_id: ThreadId(1),
            frames: Vec::new(),
            mode: ResolutionMode::Sampled,
            label: None,
            timestamp: None,
        }));

        let json = export_json(&exporter);
        assert_eq!(json["traceEvents"][0]["name"], EMPTY_STACK_NAME);
    }
}
