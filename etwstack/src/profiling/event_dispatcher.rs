//! # Event Dispatching
//!
//! Consumes the ordered event stream and routes each record to the registry,
//! the thread stack tracker, or the stack resolver.
//!
//! ## Event Routing
//!
//! - `ModuleDefined` / `FunctionDefined` → Symbol registry
//! - `FunctionEnter` / `FunctionExit` → Thread stack tracker
//! - `StackSample` → Address resolution → [`TraceOutput::Stack`]
//! - `Mark` (stack capture) → Thread stack resolution → [`TraceOutput::Stack`]
//! - `Mark` (point, range) → [`TraceOutput::Marker`]
//!
//! Records are handled strictly in delivery order. Nothing is buffered or
//! reordered, and no anomaly stops the stream.
//!
//! ## Output Modes
//!
//! - **Return value**: every output is returned from [`EventDispatcher::process_event`]
//! - **Channel**: forwarded to a consumer thread via non-blocking send
//! - **Export**: added to the Chrome trace exporter

use crossbeam_channel::{Sender, TrySendError};
use etwstack_common::TraceRecord;
use log::debug;
use std::io::BufRead;

use super::diagnostics::{AnomalyLog, DispatchStats};
use super::stack_resolver::StackResolver;
use super::thread_stacks::ThreadStackTracker;
use crate::classification::FrameFilter;
use crate::domain::{CorrelationError, FunctionId, InputError, ModuleId, ThreadId};
use crate::export::ChromeTraceExporter;
use crate::symbolization::SymbolRegistry;
use crate::trace_data::{
    parse_event_line, ResolutionMode, ResolvedStack, TimedRecord, TimelineMarker, TraceOutput,
};

/// Encapsulates event correlation logic and state
pub struct EventDispatcher {
    // Correlation state
    registry: SymbolRegistry,
    stacks: ThreadStackTracker,
    filter: FrameFilter,

    // Diagnostics
    stats: DispatchStats,
    anomalies: AnomalyLog,

    // Optional outputs
    trace_exporter: Option<ChromeTraceExporter>,
    output_tx: Option<Sender<TraceOutput>>,
}

impl EventDispatcher {
    /// Create a dispatcher with an empty registry
    #[must_use]
    pub fn new(filter: FrameFilter) -> Self {
        Self {
            registry: SymbolRegistry::new(),
            stacks: ThreadStackTracker::new(),
            filter,
            stats: DispatchStats::default(),
            anomalies: AnomalyLog::new(),
            trace_exporter: None,
            output_tx: None,
        }
    }

    /// Also add every output to a Chrome trace
    #[must_use]
    pub fn with_exporter(mut self, exporter: ChromeTraceExporter) -> Self {
        self.trace_exporter = Some(exporter);
        self
    }

    /// Also forward every output to a consumer channel
    ///
    /// Sends never block; outputs the consumer cannot take are dropped and
    /// counted in [`DispatchStats::channel_dropped`].
    #[must_use]
    pub fn with_output_channel(mut self, tx: Sender<TraceOutput>) -> Self {
        self.output_tx = Some(tx);
        self
    }

    /// Process a single event
    pub fn process_event(&mut self, event: TimedRecord) -> Option<TraceOutput> {
        self.stats.events += 1;
        let timestamp = event.timestamp();

        match event.record {
            TraceRecord::ModuleDefined { id, source_file } => {
                self.stats.modules_defined += 1;
                self.registry.define_module(ModuleId(id), source_file);
                None
            }
            TraceRecord::FunctionDefined { id, module_id, name, begin_address, end_address } => {
                self.stats.functions_defined += 1;
                let result = self.registry.define_function(
                    FunctionId(id),
                    ModuleId(module_id),
                    name,
                    begin_address,
                    end_address,
                );
                if let Err(e) = result {
                    self.stats.unknown_module += 1;
                    self.anomalies.report(&e);
                }
                None
            }
            TraceRecord::FunctionEnter { thread_id, function_id } => {
                self.stats.enters += 1;
                self.stacks.enter(ThreadId(thread_id), FunctionId(function_id));
                None
            }
            TraceRecord::FunctionExit { thread_id, function_id } => {
                self.stats.exits += 1;
                if let Err(e) = self.stacks.exit(ThreadId(thread_id), FunctionId(function_id)) {
                    self.stats.stack_mismatch += 1;
                    self.anomalies.report(&e);
                }
                None
            }
            TraceRecord::StackSample { thread_id, addresses } => {
                self.stats.samples += 1;
                // Definitions since the last sample are merged in one sort
                self.registry.seal();

                let resolution =
                    StackResolver::new(&self.registry, &self.filter).resolve_addresses(&addresses);
                self.stats.unresolved_addresses += resolution.misses as u64;

                Some(self.emit(TraceOutput::Stack(ResolvedStack {
                    thread_id: ThreadId(thread_id),
                    frames: resolution.frames,
                    mode: ResolutionMode::Sampled,
                    label: None,
                    timestamp,
                })))
            }
            TraceRecord::Mark { thread_id, label, kind } => {
                self.stats.marks += 1;
                let thread_id = ThreadId(thread_id);

                let output = if kind.captures_stack() {
                    let resolution = StackResolver::new(&self.registry, &self.filter)
                        .resolve_thread(&self.stacks, thread_id);
                    if resolution.misses > 0 {
                        debug!("{thread_id}: {} frames not yet defined at mark {label:?}", resolution.misses);
                    }
                    self.stats.unresolved_ids += resolution.misses as u64;

                    TraceOutput::Stack(ResolvedStack {
                        thread_id,
                        frames: resolution.frames,
                        mode: ResolutionMode::Instrumented,
                        label: Some(label),
                        timestamp,
                    })
                } else {
                    TraceOutput::Marker(TimelineMarker { thread_id, label, kind, timestamp })
                };
                Some(self.emit(output))
            }
        }
    }

    /// Process a record that carries no timestamp
    pub fn process_record(&mut self, record: TraceRecord) -> Option<TraceOutput> {
        self.process_event(TimedRecord::untimed(record))
    }

    /// Count and log an event that could not be decoded
    pub fn report_malformed(&mut self, error: &CorrelationError) {
        self.stats.malformed += 1;
        self.anomalies.report(error);
    }

    /// Replay a decoded JSON-lines event stream
    ///
    /// Malformed lines are reported and skipped. `on_output` sees every
    /// output in stream order. Returns the number of events processed.
    ///
    /// # Errors
    /// Returns an error only if reading from `reader` fails
    pub fn replay<R: BufRead>(
        &mut self,
        mut reader: R,
        mut on_output: impl FnMut(&TraceOutput),
    ) -> Result<usize, InputError> {
        let mut processed = 0;
        let mut line = Vec::new();
        let mut line_no = 0;
        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line)? == 0 {
                break;
            }
            line_no += 1;
            match parse_event_line(line_no, &line) {
                Ok(Some(event)) => {
                    processed += 1;
                    if let Some(output) = self.process_event(event) {
                        on_output(&output);
                    }
                }
                Ok(None) => {}
                Err(e) => self.report_malformed(&e),
            }
        }
        Ok(processed)
    }

    fn emit(&mut self, output: TraceOutput) -> TraceOutput {
        match &output {
            TraceOutput::Stack(stack) => {
                self.stats.stacks_emitted += 1;
                if stack.is_empty() {
                    self.stats.empty_stacks += 1;
                }
            }
            TraceOutput::Marker(_) => self.stats.markers_emitted += 1,
        }

        if let Some(ref mut exporter) = self.trace_exporter {
            exporter.add_output(&output);
        }

        if let Some(ref tx) = self.output_tx {
            // Non-blocking send (drop if consumer is slow or gone)
            match tx.try_send(output.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                    self.stats.channel_dropped += 1;
                }
            }
        }

        output
    }

    #[must_use]
    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    #[must_use]
    pub fn registry(&self) -> &SymbolRegistry {
        &self.registry
    }

    #[must_use]
    pub fn stacks(&self) -> &ThreadStackTracker {
        &self.stacks
    }

    #[must_use]
    pub fn filter(&self) -> &FrameFilter {
        &self.filter
    }

    /// Filter rules may be extended mid-stream; they apply to later stacks
    pub fn filter_mut(&mut self) -> &mut FrameFilter {
        &mut self.filter
    }

    /// Take the trace exporter (for final export)
    pub fn take_exporter(&mut self) -> Option<ChromeTraceExporter> {
        self.trace_exporter.take()
    }
}
