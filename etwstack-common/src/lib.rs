//! # Shared Event Vocabulary (Backends ↔ Correlation Engine)
//!
//! Defines the typed records that event-producing backends hand to the
//! correlation engine once the trace transport has decoded them. Both the
//! statistical stack sampler and the instrumenting call hook speak this one
//! vocabulary, so the engine dispatches a single enum regardless of which
//! backend produced the stream.
//!
//! ## Backends
//!
//! 1. **Stack sampling** - emits `FunctionDefined` with address ranges, then
//!    periodic `StackSample` records carrying raw instruction addresses
//! 2. **Instrumentation** - emits `FunctionDefined` without ranges, then
//!    `FunctionEnter` / `FunctionExit` pairs per call
//!
//! Both emit `ModuleDefined` and user `Mark` records.
//!
//! ## Key Types
//!
//! - [`TraceRecord`] - One decoded event
//! - [`MarkKind`] - Mark discriminator, with the backend wire values

use std::fmt;

// ============================================================================
// Provider Constants
// ============================================================================

/// Name of the trace-event provider that backends register
pub const PROVIDER_NAME: &str = "Python";

/// GUID of the trace-event provider that backends register
pub const PROVIDER_GUID: &str = "99a10640-320d-4b37-9e26-c311d86da7ab";

/// **Definition**: a module (source file) was loaded
pub const EVENT_MODULE: &str = "PythonModule";

/// **Definition**: a function body was created
///
/// Sampling backends include `BeginAddress` / `EndAddress`.
pub const EVENT_FUNCTION: &str = "PythonFunction";

/// **Instrumentation**: a call was entered
///
/// Paired with: `EVENT_FUNCTION_POP`
pub const EVENT_FUNCTION_PUSH: &str = "PythonFunctionPush";

/// **Instrumentation**: a call returned
///
/// Paired with: `EVENT_FUNCTION_PUSH`
pub const EVENT_FUNCTION_POP: &str = "PythonFunctionPop";

/// **Sampling**: an OS stack walk of one thread
pub const EVENT_STACK_SAMPLE: &str = "PythonStackSample";

/// **User**: a timeline mark
pub const EVENT_MARK: &str = "PythonMark";

// ============================================================================
// Marks
// ============================================================================

/// Kind of a user-inserted mark
///
/// The numeric values are the ones backends write on the wire.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MarkKind {
    /// Instant marker on the timeline
    Point = 0,
    /// Opens a named range
    RangeBegin = 1,
    /// Closes a named range
    RangeEnd = 2,
    /// Requests resolution of the emitting thread's current stack
    StackCapture = 3,
}

impl MarkKind {
    /// Returns true if this mark asks for a stack resolution
    #[must_use]
    pub fn captures_stack(self) -> bool {
        matches!(self, MarkKind::StackCapture)
    }
}

/// Wire value that does not name a [`MarkKind`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownMarkKind(pub u8);

impl fmt::Display for UnknownMarkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown mark kind {}", self.0)
    }
}

impl std::error::Error for UnknownMarkKind {}

impl TryFrom<u8> for MarkKind {
    type Error = UnknownMarkKind;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MarkKind::Point),
            1 => Ok(MarkKind::RangeBegin),
            2 => Ok(MarkKind::RangeEnd),
            3 => Ok(MarkKind::StackCapture),
            other => Err(UnknownMarkKind(other)),
        }
    }
}

impl From<MarkKind> for u8 {
    fn from(kind: MarkKind) -> Self {
        kind as u8
    }
}

// ============================================================================
// Records
// ============================================================================

/// One decoded trace event
///
/// Ids are the raw integers assigned by the monitored runtime. Thread ids are
/// OS thread ids. Addresses are innermost first, as a frame-pointer or shadow
/// stack walk produces them.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "event", rename_all = "snake_case"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceRecord {
    ModuleDefined {
        id: u64,
        /// `None` when the module is not backed by a user file
        source_file: Option<String>,
    },
    FunctionDefined {
        id: u64,
        module_id: u64,
        name: String,
        /// First byte of the compiled body (sampling backends only)
        begin_address: Option<u64>,
        /// Last byte of the compiled body, inclusive (sampling backends only)
        end_address: Option<u64>,
    },
    FunctionEnter {
        thread_id: u32,
        function_id: u64,
    },
    FunctionExit {
        thread_id: u32,
        function_id: u64,
    },
    StackSample {
        thread_id: u32,
        addresses: Vec<u64>,
    },
    Mark {
        thread_id: u32,
        label: String,
        kind: MarkKind,
    },
}

impl TraceRecord {
    /// Provider event name this record was decoded from
    #[must_use]
    pub fn event_name(&self) -> &'static str {
        match self {
            TraceRecord::ModuleDefined { .. } => EVENT_MODULE,
            TraceRecord::FunctionDefined { .. } => EVENT_FUNCTION,
            TraceRecord::FunctionEnter { .. } => EVENT_FUNCTION_PUSH,
            TraceRecord::FunctionExit { .. } => EVENT_FUNCTION_POP,
            TraceRecord::StackSample { .. } => EVENT_STACK_SAMPLE,
            TraceRecord::Mark { .. } => EVENT_MARK,
        }
    }

    /// Emitting thread, for records that are bound to one
    #[must_use]
    pub fn thread_id(&self) -> Option<u32> {
        match self {
            TraceRecord::ModuleDefined { .. } | TraceRecord::FunctionDefined { .. } => None,
            TraceRecord::FunctionEnter { thread_id, .. }
            | TraceRecord::FunctionExit { thread_id, .. }
            | TraceRecord::StackSample { thread_id, .. }
            | TraceRecord::Mark { thread_id, .. } => Some(*thread_id),
        }
    }
}
