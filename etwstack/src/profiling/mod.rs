//! Correlation core modules
//!
//! This module contains the stack reconstruction engine:
//! - Per-thread logical call stacks
//! - Stack resolution for both backends
//! - Event dispatching and output routing
//! - Dispatcher diagnostics
//! - Headless display formatting

pub mod diagnostics;
pub mod event_display;
pub mod event_dispatcher;
pub mod stack_resolver;
pub mod thread_stacks;

// Re-export common types
pub use diagnostics::{technical_info, AnomalyLog, DispatchStats};
pub use event_display::{
    display_hotspots, display_output, display_statistics, format_hotspots, format_marker,
    format_stack,
};
pub use event_dispatcher::EventDispatcher;
pub use stack_resolver::{Resolution, StackResolver};
pub use thread_stacks::ThreadStackTracker;
