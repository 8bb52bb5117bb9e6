//! Hotspot analysis for resolved stacks.
//!
//! This module aggregates resolved stacks by their innermost script frame to
//! identify hotspots - the functions most often found running when a sample
//! or stack-capture mark was taken.
//!
//! # Architecture
//!
//! - **`HotspotStats`** - Incremental aggregation as outputs stream in
//! - **`analyze_hotspots()`** - Batch analysis of a collected slice
//!
//! ## Data Flow
//!
//! ```text
//! EventDispatcher
//!     │
//!     └──► TraceOutput::Stack ──► HotspotStats.record_stack()
//!                                      │
//!                                      └──► to_hotspots() ──► summary
//! ```
//!
//! # Performance
//!
//! - `record_stack()`: O(depth) amortized (`HashMap` insert/update keyed by frames)
//! - `to_hotspots()`: O(n log n) where n = unique innermost frames (sorting)
//! - Memory: O(unique functions) × O(call stacks per function)

// Percentage calculations intentionally convert u64 to f64
#![allow(clippy::cast_precision_loss)]

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::domain::ThreadId;
use crate::trace_data::ResolvedStack;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Maximum unique call stacks to store per hotspot.
///
/// A function reached from many call sites would otherwise grow without
/// bound. Five is enough to show the main call patterns.
const MAX_CALL_STACKS_PER_HOTSPOT: usize = 5;

// =============================================================================
// FUNCTION HOTSPOT (OUTPUT TYPE)
// =============================================================================

/// A function hotspot with aggregated statistics.
///
/// ```text
/// HOTSPOTS (3 stacks)
/// ─────────────────────────────────
///   c                          33.3%  3 stacks on 1 thread(s)
///   b                          33.3%
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionHotspot {
    /// Innermost script frame name.
    pub name: String,

    /// Number of stacks with this function innermost.
    pub count: u64,

    /// Percentage of all non-empty stacks (0.0 - 100.0).
    pub percentage: f64,

    /// Per-thread breakdown: thread → stack count.
    pub threads: BTreeMap<ThreadId, u64>,

    /// Representative call stacks (innermost first), most common first.
    ///
    /// Limited to `MAX_CALL_STACKS_PER_HOTSPOT`.
    pub call_stacks: Vec<Vec<String>>,
}

// =============================================================================
// HOTSPOT STATS (AGGREGATOR)
// =============================================================================

/// Incremental hotspot statistics aggregator.
#[derive(Debug, Default)]
pub struct HotspotStats {
    /// Per-function statistics, keyed by innermost frame name.
    functions: HashMap<String, FunctionStats>,

    /// Total non-empty stacks recorded.
    total_samples: u64,

    /// Stacks with no script frames; not attributed to any function.
    empty_samples: u64,
}

/// Internal statistics for a single function.
#[derive(Debug, Clone, Default)]
struct FunctionStats {
    count: u64,
    threads: BTreeMap<ThreadId, u64>,
    /// Representative call stacks with their occurrence counts.
    call_stacks: Vec<(Vec<String>, u64)>,
}

impl HotspotStats {
    /// Create new empty statistics tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a resolved stack into the aggregator.
    pub fn record_stack(&mut self, stack: &ResolvedStack) {
        let Some(innermost) = stack.innermost() else {
            self.empty_samples += 1;
            return;
        };

        self.total_samples += 1;

        let stats = self.functions.entry(innermost.to_string()).or_default();
        stats.count += 1;
        *stats.threads.entry(stack.thread_id).or_insert(0) += 1;

        if let Some((_, count)) = stats.call_stacks.iter_mut().find(|(frames, _)| *frames == stack.frames) {
            *count += 1;
        } else if stats.call_stacks.len() < MAX_CALL_STACKS_PER_HOTSPOT {
            stats.call_stacks.push((stack.frames.clone(), 1));
        }
    }

    /// Get total non-empty stacks recorded
    #[must_use]
    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    #[must_use]
    pub fn empty_samples(&self) -> u64 {
        self.empty_samples
    }

    /// Convert cumulative stats to a hotspot list, most frequent first
    #[must_use]
    pub fn to_hotspots(&self) -> Vec<FunctionHotspot> {
        let mut hotspots: Vec<FunctionHotspot> = self
            .functions
            .iter()
            .map(|(name, stats)| {
                let percentage = if self.total_samples > 0 {
                    (stats.count as f64 / self.total_samples as f64) * 100.0
                } else {
                    0.0
                };

                // Sort call stacks by frequency
                let mut sorted_stacks = stats.call_stacks.clone();
                sorted_stacks.sort_by_key(|(_, count)| std::cmp::Reverse(*count));

                FunctionHotspot {
                    name: name.clone(),
                    count: stats.count,
                    percentage,
                    threads: stats.threads.clone(),
                    call_stacks: sorted_stacks.into_iter().map(|(frames, _)| frames).collect(),
                }
            })
            .collect();

        // Ties broken by name so output is stable across runs
        hotspots.sort_unstable_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
        hotspots
    }
}

/// Analyze a batch of resolved stacks (most frequent first).
///
/// For incremental updates while a stream is still being read, use
/// `HotspotStats`.
#[must_use]
pub fn analyze_hotspots(stacks: &[ResolvedStack]) -> Vec<FunctionHotspot> {
    let mut stats = HotspotStats::new();
    for stack in stacks {
        stats.record_stack(stack);
    }
    stats.to_hotspots()
}
