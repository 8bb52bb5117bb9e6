//! # Trace Sessions
//!
//! A [`TraceSession`] is one independent correlation engine plus the queue
//! that feeds it. User code and backends get a cheap, cloneable [`Tracer`]
//! handle; any number of threads emit through it into the session's queue,
//! and the owner of the session drains the queue through the dispatcher.
//!
//! ```text
//!   thread A ──► Tracer ──┐
//!   thread B ──► Tracer ──┼──► crossbeam queue ──► TraceSession::drain()
//!   backend  ──► Tracer ──┘                          │
//!                                                    └──► EventDispatcher ──► Vec<TraceOutput>
//! ```
//!
//! Each thread's records stay in program order in the queue, which is all
//! the dispatcher needs. Sessions share nothing, so several can run in one
//! process.

use crossbeam_channel::{Receiver, Sender};
use etwstack_common::{MarkKind, TraceRecord};
use log::info;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::classification::{FilterConfig, FrameFilter};
use crate::domain::{FunctionId, ThreadId};
use crate::profiling::{DispatchStats, EventDispatcher};
use crate::trace_data::{TimedRecord, TraceOutput};

pub use crate::domain::TracerError;

const STATE_DISABLED: u8 = 0;
const STATE_ENABLED: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// State shared between a session and its tracers
#[derive(Debug)]
struct SessionShared {
    state: AtomicU8,
    /// Timestamps are nanoseconds since this instant
    epoch: Instant,
}

/// One correlation engine and its producer queue
pub struct TraceSession {
    dispatcher: EventDispatcher,
    tx: Sender<TimedRecord>,
    rx: Receiver<TimedRecord>,
    shared: Arc<SessionShared>,
}

impl TraceSession {
    /// Create a disabled session with the given filter rules
    #[must_use]
    pub fn new(config: &FilterConfig) -> Self {
        Self::from_dispatcher(EventDispatcher::new(FrameFilter::from_config(config)))
    }

    /// Create a disabled session around a configured dispatcher
    #[must_use]
    pub fn from_dispatcher(dispatcher: EventDispatcher) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            dispatcher,
            tx,
            rx,
            shared: Arc::new(SessionShared {
                state: AtomicU8::new(STATE_DISABLED),
                epoch: Instant::now(),
            }),
        }
    }

    /// Start accepting records from tracers
    ///
    /// `infrastructure_files` are the tracer's own source files and the
    /// thread library's file; they are added to the ignore set so the
    /// tracer never shows up in its own stacks.
    pub fn enable<I, S>(&mut self, infrastructure_files: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.dispatcher.filter_mut().ignore(infrastructure_files);
        self.shared.state.store(STATE_ENABLED, Ordering::Release);
        info!("Trace session enabled");
    }

    /// Stop accepting records; already queued records can still be drained
    pub fn disable(&mut self) {
        self.shared.state.store(STATE_DISABLED, Ordering::Release);
        info!("Trace session disabled");
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.shared.state.load(Ordering::Acquire) == STATE_ENABLED
    }

    /// New producer handle for this session
    #[must_use]
    pub fn tracer(&self) -> Tracer {
        Tracer { tx: self.tx.clone(), shared: Arc::clone(&self.shared) }
    }

    /// Add files whose frames are never reported
    pub fn ignore<I, S>(&mut self, files: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.dispatcher.filter_mut().ignore(files);
    }

    /// Restrict reported frames to files under these prefixes
    pub fn include<I, S>(&mut self, prefixes: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.dispatcher.filter_mut().include(prefixes);
    }

    /// Dispatch every queued record, returning the outputs in order
    pub fn drain(&mut self) -> Vec<TraceOutput> {
        let mut outputs = Vec::new();
        while let Ok(record) = self.rx.try_recv() {
            if let Some(output) = self.dispatcher.process_event(record) {
                outputs.push(output);
            }
        }
        outputs
    }

    /// Records queued and not yet drained
    #[must_use]
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    #[must_use]
    pub fn stats(&self) -> &DispatchStats {
        self.dispatcher.stats()
    }

    #[must_use]
    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut EventDispatcher {
        &mut self.dispatcher
    }
}

impl Drop for TraceSession {
    fn drop(&mut self) {
        self.shared.state.store(STATE_CLOSED, Ordering::Release);
    }
}

/// Producer handle for a [`TraceSession`]
///
/// Cheap to clone and safe to share across threads. Records are stamped
/// with the emitting OS thread and the time since the session was created.
#[derive(Debug, Clone)]
pub struct Tracer {
    tx: Sender<TimedRecord>,
    shared: Arc<SessionShared>,
}

impl Tracer {
    /// Queue a record for the session
    ///
    /// # Errors
    /// Returns [`TracerError::NotEnabled`] if the session is disabled, or
    /// [`TracerError::SessionClosed`] once it has been dropped
    pub fn emit(&self, record: TraceRecord) -> Result<(), TracerError> {
        match self.shared.state.load(Ordering::Acquire) {
            STATE_ENABLED => {}
            STATE_CLOSED => return Err(TracerError::SessionClosed),
            _ => return Err(TracerError::NotEnabled),
        }

        let timestamp_ns = u64::try_from(self.shared.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX);
        self.tx
            .send(TimedRecord::at(timestamp_ns, record))
            .map_err(|_| TracerError::SessionClosed)
    }

    /// Write a mark of any kind on the current thread
    ///
    /// # Errors
    /// See [`Tracer::emit`]
    pub fn write_mark(&self, label: &str, kind: MarkKind) -> Result<(), TracerError> {
        self.emit(TraceRecord::Mark { thread_id: current_thread_id().0, label: label.to_string(), kind })
    }

    /// Instant marker on the timeline
    ///
    /// # Errors
    /// See [`Tracer::emit`]
    pub fn mark(&self, label: &str) -> Result<(), TracerError> {
        self.write_mark(label, MarkKind::Point)
    }

    /// Open a named range that closes when the guard is dropped
    ///
    /// # Errors
    /// See [`Tracer::emit`]; nothing is opened on error
    pub fn mark_range(&self, label: &str) -> Result<RangeMark, TracerError> {
        self.write_mark(label, MarkKind::RangeBegin)?;
        Ok(RangeMark { tracer: self.clone(), label: label.to_string() })
    }

    /// Ask the engine to resolve this thread's current stack
    ///
    /// # Errors
    /// See [`Tracer::emit`]
    pub fn mark_stack(&self, label: &str) -> Result<(), TracerError> {
        self.write_mark(label, MarkKind::StackCapture)
    }

    /// Record entry into `function` on the current thread
    ///
    /// # Errors
    /// See [`Tracer::emit`]
    pub fn function_enter(&self, function: FunctionId) -> Result<(), TracerError> {
        self.emit(TraceRecord::FunctionEnter { thread_id: current_thread_id().0, function_id: function.0 })
    }

    /// Record return from `function` on the current thread
    ///
    /// # Errors
    /// See [`Tracer::emit`]
    pub fn function_exit(&self, function: FunctionId) -> Result<(), TracerError> {
        self.emit(TraceRecord::FunctionExit { thread_id: current_thread_id().0, function_id: function.0 })
    }
}

/// Guard for an open range mark; emits the range end on drop
#[must_use = "the range ends as soon as the guard is dropped"]
#[derive(Debug)]
pub struct RangeMark {
    tracer: Tracer,
    label: String,
}

impl RangeMark {
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Drop for RangeMark {
    fn drop(&mut self) {
        // A session closed mid-range simply loses the end mark
        let _ = self.tracer.write_mark(&self.label, MarkKind::RangeEnd);
    }
}

/// OS thread id of the calling thread
#[cfg(target_os = "linux")]
#[must_use]
#[allow(unsafe_code, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn current_thread_id() -> ThreadId {
    // SAFETY: gettid takes no arguments and cannot fail
    let tid = unsafe { libc::syscall(libc::SYS_gettid) };
    ThreadId(tid as u32)
}

/// Process-unique id of the calling thread
#[cfg(not(target_os = "linux"))]
#[must_use]
pub fn current_thread_id() -> ThreadId {
    use std::sync::atomic::AtomicU32;

    static NEXT_ID: AtomicU32 = AtomicU32::new(1);
    thread_local! {
        static ID: u32 = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    }
    ThreadId(ID.with(|id| *id))
}
