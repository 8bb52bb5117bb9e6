//! Structured error types for etwstack
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! None of the correlation errors are fatal: the dispatcher reports them and
//! keeps consuming events.

use super::types::{FunctionId, ModuleId, ThreadId};
use thiserror::Error;

/// Anomalies found while correlating an event stream
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CorrelationError {
    #[error("{function} references unregistered {module}")]
    UnknownModule { function: FunctionId, module: ModuleId },

    #[error("exit of {expected} on {thread} but stack top was {}", describe_top(*.found))]
    StackMismatch { thread: ThreadId, expected: FunctionId, found: Option<FunctionId> },

    #[error("no {0} in registry")]
    NotFound(Lookup),

    #[error("malformed event at line {line}: {reason}")]
    MalformedEvent { line: usize, reason: String },
}

fn describe_top(found: Option<FunctionId>) -> String {
    found.map_or_else(|| "empty".to_string(), |id| id.to_string())
}

/// What a failed registry lookup was searching for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Function(FunctionId),
    Address(u64),
}

impl std::fmt::Display for Lookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lookup::Function(id) => write!(f, "{id}"),
            Lookup::Address(addr) => write!(f, "function containing 0x{addr:x}"),
        }
    }
}

#[derive(Error, Debug)]
pub enum InputError {
    #[error("Failed to read event stream: {0}")]
    ReadFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Failures of the producer-side [`Tracer`](crate::session::Tracer) handle
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracerError {
    #[error("unable to mark: trace session is not enabled")]
    NotEnabled,

    #[error("unable to mark: trace session has been closed")]
    SessionClosed,
}
