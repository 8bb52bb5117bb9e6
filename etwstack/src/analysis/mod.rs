//! Analysis of resolved stacks
//!
//! Pure aggregation logic, separated from the printers in
//! [`crate::profiling::event_display`].

pub mod hotspot_analyzer;

pub use hotspot_analyzer::{analyze_hotspots, FunctionHotspot, HotspotStats};
