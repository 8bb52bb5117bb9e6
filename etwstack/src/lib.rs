//! # etwstack - Script Call-Stack Reconstruction from Trace Events
//!
//! A monitored script runtime emits low-level events to an OS trace facility:
//! module and function definitions, call entry/exit or periodic native stack
//! samples, and user-inserted marks. etwstack takes the decoded event stream
//! and rebuilds, per thread, the symbolic call stack that was active at each
//! sample or mark, keeping only frames from the user's own script code.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Monitored Script Runtime                     │
//! │   sampling backend (addresses)  |  call hook (enter / exit)     │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ decoded TraceRecords (etwstack-common)
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     etwstack (This Crate)                       │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │   Session /  │──▶│    Event     │──▶│    Stack     │         │
//! │  │ JSONL reader │   │  Dispatcher  │   │   Resolver   │         │
//! │  └──────────────┘   └──────┬───────┘   └──────┬───────┘         │
//! │                            │                  │                 │
//! │                ┌───────────┴──────┐    ┌──────┴───────┐         │
//! │                ▼                  ▼    ▼              ▼         │
//! │        ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   │
//! │        │    Symbol    │   │ Thread Stack │   │    Frame     │   │
//! │        │   Registry   │   │   Tracker    │   │    Filter    │   │
//! │        └──────────────┘   └──────────────┘   └──────────────┘   │
//! │                                                                 │
//! │  Outputs ──▶ text | JSON lines | Chrome trace | hotspots        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! ### Core Pipeline Modules
//!
//! - [`symbolization`]: Module/function registry; id and address lookup
//! - [`classification`]: Frame filter (ignore files, include prefixes)
//! - [`profiling`]: Thread stacks, stack resolver, event dispatcher
//!   - `event_dispatcher`: Routes each record and emits resolved stacks
//!   - `stack_resolver`: Id snapshots and address walks to frame names
//!   - `diagnostics`: Counters and de-duplicated anomaly warnings
//! - [`session`]: In-process session with a cloneable [`session::Tracer`]
//!
//! ### Data and Output Modules
//!
//! - [`trace_data`]: Input envelope, output records, JSON-lines parsing
//! - [`export`]: Chrome Trace Event Format and JSON-lines writers
//! - [`analysis`]: Hotspot aggregation
//! - [`cli`]: Command-line argument parsing
//! - [`domain`]: Core domain types (`ThreadId`, `FunctionId`, `ModuleId`) and errors
//!
//! ## Resolution Modes
//!
//! ### 1. Instrumented (call hook)
//! - Entry/exit events maintain a logical stack per thread
//! - A stack-capture mark resolves the emitting thread's stack by id
//!
//! ### 2. Sampled (stack walker)
//! - Function definitions carry `[begin, end]` code ranges
//! - Each sample's raw addresses are resolved by range containment
//!
//! ## Typical Usage
//!
//! ```bash
//! # Print resolved stacks from a decoded stream
//! ./etwstack events.jsonl
//!
//! # Hotspot summary and Chrome trace
//! ./etwstack events.jsonl --summary --format none --export trace.json
//! ```
//!
//! ```
//! use etwstack::classification::FilterConfig;
//! use etwstack::session::TraceSession;
//!
//! let mut session = TraceSession::new(&FilterConfig::default());
//! session.enable(["/site-packages/tracer/__init__.py"]);
//!
//! let tracer = session.tracer();
//! tracer.mark("startup").unwrap();
//!
//! let outputs = session.drain();
//! assert_eq!(outputs.len(), 1);
//! ```
//!
//! ## Key Concepts
//!
//! - **Script frame**: a frame whose module's source file is user code
//! - **Mark**: user timeline annotation; stack-capture marks request a stack
//! - **Seal**: merge of freshly defined address ranges into the sorted index

// Expose modules for testing
pub mod analysis;
pub mod classification;
pub mod cli;
pub mod domain;
pub mod export;
pub mod profiling;
pub mod session;
pub mod symbolization;
pub mod trace_data;
