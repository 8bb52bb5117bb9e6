//! Per-thread logical call stacks for the instrumentation backend
//!
//! Entry and exit events arrive already serialized across threads, so a plain
//! map from thread id to an id stack is enough. Stacks hold function ids only;
//! names are looked up in the registry when a stack is resolved.

use log::debug;
use std::collections::HashMap;

use crate::domain::{CorrelationError, FunctionId, ThreadId};

/// Tracks the open calls of every thread seen so far
#[derive(Debug, Default)]
pub struct ThreadStackTracker {
    /// Innermost call is the last element
    stacks: HashMap<ThreadId, Vec<FunctionId>>,
}

impl ThreadStackTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push `function` on `thread`'s stack
    ///
    /// Entries are not checked against the registry; they may arrive before
    /// the function definition does.
    pub fn enter(&mut self, thread: ThreadId, function: FunctionId) {
        self.stacks.entry(thread).or_default().push(function);
    }

    /// Pop the top of `thread`'s stack, checking it is `function`
    ///
    /// The top is popped even when it does not match, so one lost event does
    /// not poison the rest of the thread's history.
    ///
    /// # Errors
    /// Returns [`CorrelationError::StackMismatch`] if the stack was empty or
    /// its top was a different function
    pub fn exit(&mut self, thread: ThreadId, function: FunctionId) -> Result<(), CorrelationError> {
        let Some(stack) = self.stacks.get_mut(&thread) else {
            return Err(CorrelationError::StackMismatch { thread, expected: function, found: None });
        };

        let found = stack.pop();
        if stack.is_empty() {
            debug!("{thread} returned to an empty stack");
            self.stacks.remove(&thread);
        }

        match found {
            Some(top) if top == function => Ok(()),
            found => Err(CorrelationError::StackMismatch { thread, expected: function, found }),
        }
    }

    /// Copy of `thread`'s stack, innermost first
    #[must_use]
    pub fn snapshot(&self, thread: ThreadId) -> Vec<FunctionId> {
        self.stacks
            .get(&thread)
            .map(|stack| stack.iter().rev().copied().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn depth(&self, thread: ThreadId) -> usize {
        self.stacks.get(&thread).map_or(0, Vec::len)
    }

    /// Threads with at least one open call, in ascending id order
    #[must_use]
    pub fn active_threads(&self) -> Vec<ThreadId> {
        let mut threads: Vec<ThreadId> = self.stacks.keys().copied().collect();
        threads.sort_unstable();
        threads
    }
}
