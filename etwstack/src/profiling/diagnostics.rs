//! Dispatcher counters and anomaly reporting
//!
//! Correlation anomalies are never fatal, but a trace full of them usually
//! means events were lost in transport. These counters make that visible at
//! the end of a run; [`AnomalyLog`] keeps the log readable by warning once
//! per distinct cause.

use log::warn;
use serde::Serialize;
use std::collections::HashSet;

use crate::classification::FilterConfig;
use crate::domain::{CorrelationError, FunctionId, ModuleId, ThreadId};

/// Counters kept by the event dispatcher
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub events: u64,
    pub modules_defined: u64,
    pub functions_defined: u64,
    pub enters: u64,
    pub exits: u64,
    pub samples: u64,
    pub marks: u64,
    /// Resolved stacks handed to sinks
    pub stacks_emitted: u64,
    /// Resolved stacks with no script frames left after filtering
    pub empty_stacks: u64,
    /// Point and range marks handed to sinks
    pub markers_emitted: u64,
    pub unknown_module: u64,
    pub stack_mismatch: u64,
    pub malformed: u64,
    /// Ids skipped during instrumented resolution
    pub unresolved_ids: u64,
    /// Addresses that matched no function (native frames)
    pub unresolved_addresses: u64,
    /// Outputs dropped because the consumer channel was full or closed
    pub channel_dropped: u64,
}

impl DispatchStats {
    /// Total anomalies reported
    #[must_use]
    pub fn anomalies(&self) -> u64 {
        self.unknown_module + self.stack_mismatch + self.malformed
    }
}

/// Key a warning is de-duplicated on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum AnomalyKey {
    UnknownModule(ModuleId),
    StackMismatch(ThreadId, FunctionId),
}

/// Warns once per distinct anomaly
///
/// Repeats are still counted by [`DispatchStats`], just not logged again.
/// Malformed lines are always logged since each carries its own line number.
#[derive(Debug, Default)]
pub struct AnomalyLog {
    warned: HashSet<AnomalyKey>,
}

impl AnomalyLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Log `error` unless an equivalent warning was already emitted
    ///
    /// Returns true if a warning was written.
    pub fn report(&mut self, error: &CorrelationError) -> bool {
        let key = match error {
            CorrelationError::UnknownModule { module, .. } => AnomalyKey::UnknownModule(*module),
            CorrelationError::StackMismatch { thread, expected, .. } => {
                AnomalyKey::StackMismatch(*thread, *expected)
            }
            CorrelationError::MalformedEvent { .. } => {
                warn!("Dropping event: {error}");
                return true;
            }
            // Lookup misses are part of normal operation
            CorrelationError::NotFound(_) => return false,
        };

        if self.warned.insert(key) {
            warn!("{error} (further occurrences are counted, not logged)");
            true
        } else {
            false
        }
    }
}

/// One-line description of the engine and its effective filter rules
#[must_use]
pub fn technical_info(config: &FilterConfig) -> String {
    let rules = serde_json::to_string(config).unwrap_or_else(|_| "{}".to_string());
    format!(
        "{} {} (protocol provider {} {{{}}}) filter={rules}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        etwstack_common::PROVIDER_NAME,
        etwstack_common::PROVIDER_GUID,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_module_warns_once_per_module() {
        let mut log = AnomalyLog::new();
        let first = CorrelationError::UnknownModule { function: FunctionId(1), module: ModuleId(9) };
        let second = CorrelationError::UnknownModule { function: FunctionId(2), module: ModuleId(9) };
        let other = CorrelationError::UnknownModule { function: FunctionId(3), module: ModuleId(10) };

        assert!(log.report(&first));
        assert!(!log.report(&second));
        assert!(log.report(&other));
    }

    #[test]
    fn test_malformed_always_logged() {
        let mut log = AnomalyLog::new();
        let err = CorrelationError::MalformedEvent { line: 3, reason: "eof".to_string() };
        assert!(log.report(&err));
        assert!(log.report(&err));
    }

    #[test]
    fn test_anomaly_total() {
        let stats = DispatchStats { unknown_module: 1, stack_mismatch: 2, malformed: 3, ..Default::default() };
        assert_eq!(stats.anomalies(), 6);
    }

    #[test]
    fn test_technical_info_mentions_filter() {
        let config = FilterConfig { ignore_files: vec!["x.py".to_string()], ..Default::default() };
        let info = technical_info(&config);

        assert!(info.starts_with("etwstack "));
        assert!(info.contains(etwstack_common::PROVIDER_GUID));
        assert!(info.contains("x.py"));
        assert!(!info.contains("depth"));
    }
}
