//! Trace data models for the engine's input and output
//!
//! Input is the decoded event stream: one JSON object per line, a
//! [`TraceRecord`] plus an optional transport timestamp. Output is what the
//! report sinks consume: resolved stacks and timeline markers.

use etwstack_common::{MarkKind, TraceRecord};
use serde::{Deserialize, Serialize};

use crate::domain::{CorrelationError, ThreadId, Timestamp};

/// A decoded event as it arrives from the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedRecord {
    /// Transport timestamp, when the decoder kept one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_ns: Option<u64>,
    #[serde(flatten)]
    pub record: TraceRecord,
}

impl TimedRecord {
    /// Record without a timestamp
    #[must_use]
    pub fn untimed(record: TraceRecord) -> Self {
        Self { timestamp_ns: None, record }
    }

    #[must_use]
    pub fn at(timestamp_ns: u64, record: TraceRecord) -> Self {
        Self { timestamp_ns: Some(timestamp_ns), record }
    }

    #[must_use]
    pub fn timestamp(&self) -> Option<Timestamp> {
        self.timestamp_ns.map(Timestamp)
    }
}

impl From<TraceRecord> for TimedRecord {
    fn from(record: TraceRecord) -> Self {
        Self::untimed(record)
    }
}

/// Parse one line of a decoded event stream
///
/// Takes raw bytes, so a line that is not UTF-8 is reported like any other
/// bad record. Blank lines and `#` comments yield `Ok(None)`. `line_no` is
/// 1-based and only used for the error.
///
/// # Errors
/// Returns [`CorrelationError::MalformedEvent`] if the line is not a valid record
pub fn parse_event_line(
    line_no: usize,
    line: impl AsRef<[u8]>,
) -> Result<Option<TimedRecord>, CorrelationError> {
    let trimmed = line.as_ref().trim_ascii();
    if trimmed.is_empty() || trimmed.starts_with(b"#") {
        return Ok(None);
    }

    serde_json::from_slice(trimmed)
        .map(Some)
        .map_err(|e| CorrelationError::MalformedEvent { line: line_no, reason: e.to_string() })
}

/// How the frames of a resolved stack were obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMode {
    /// From a thread's entry/exit history, on a stack-capture mark
    Instrumented,
    /// From a raw address walk, on a stack sample
    Sampled,
}

/// Symbolic, filtered stack for one point in time on one thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedStack {
    pub thread_id: ThreadId,
    /// Script frame names, innermost first
    pub frames: Vec<String>,
    pub mode: ResolutionMode,
    /// Label of the stack-capture mark that requested this stack
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
}

impl ResolvedStack {
    /// Innermost script frame, the one that was running
    #[must_use]
    pub fn innermost(&self) -> Option<&str> {
        self.frames.first().map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Point or range mark passed through to the timeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineMarker {
    pub thread_id: ThreadId,
    pub label: String,
    pub kind: MarkKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
}

/// Everything the dispatcher hands to report sinks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "output", rename_all = "snake_case")]
pub enum TraceOutput {
    Stack(ResolvedStack),
    Marker(TimelineMarker),
}

impl TraceOutput {
    #[must_use]
    pub fn thread_id(&self) -> ThreadId {
        match self {
            TraceOutput::Stack(stack) => stack.thread_id,
            TraceOutput::Marker(marker) => marker.thread_id,
        }
    }

    #[must_use]
    pub fn timestamp(&self) -> Option<Timestamp> {
        match self {
            TraceOutput::Stack(stack) => stack.timestamp,
            TraceOutput::Marker(marker) => marker.timestamp,
        }
    }

    #[must_use]
    pub fn as_stack(&self) -> Option<&ResolvedStack> {
        match self {
            TraceOutput::Stack(stack) => Some(stack),
            TraceOutput::Marker(_) => None,
        }
    }
}
