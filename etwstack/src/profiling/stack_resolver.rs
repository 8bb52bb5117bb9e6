//! Stack resolution for both backends
//!
//! Turns either a thread's logical id stack (instrumentation) or a raw
//! address walk (sampling) into the same thing: frame names, innermost
//! first, filtered down to script frames.

use log::debug;

use super::thread_stacks::ThreadStackTracker;
use crate::classification::FrameFilter;
use crate::domain::{FunctionId, ThreadId};
use crate::symbolization::{Function, SymbolRegistry};

/// Frames produced by one resolution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Reportable frame names, innermost first
    pub frames: Vec<String>,
    /// Ids or addresses that matched nothing in the registry
    pub misses: usize,
    /// Frames that resolved but were rejected by the filter
    pub filtered: usize,
}

/// Stack resolver - read-only view over the registry and filter
///
/// Borrowed for the duration of one event; holds no state of its own.
pub struct StackResolver<'a> {
    registry: &'a SymbolRegistry,
    filter: &'a FrameFilter,
}

impl<'a> StackResolver<'a> {
    #[must_use]
    pub fn new(registry: &'a SymbolRegistry, filter: &'a FrameFilter) -> Self {
        Self { registry, filter }
    }

    /// Resolve the open calls of `thread` (instrumentation mode)
    ///
    /// Ids that are not defined yet are skipped; the rest of the stack still
    /// resolves.
    #[must_use]
    pub fn resolve_thread(&self, stacks: &ThreadStackTracker, thread: ThreadId) -> Resolution {
        self.resolve_ids(&stacks.snapshot(thread))
    }

    /// Resolve a snapshot of function ids, innermost first
    #[must_use]
    pub fn resolve_ids(&self, ids: &[FunctionId]) -> Resolution {
        let mut resolution = Resolution::default();
        for &id in ids {
            match self.registry.lookup_by_id(id) {
                Ok(function) => self.push(&mut resolution, function),
                Err(e) => {
                    debug!("Skipping frame: {e}");
                    resolution.misses += 1;
                }
            }
        }
        resolution
    }

    /// Resolve a raw stack walk (sampling mode)
    ///
    /// Addresses outside every known range are native frames and are dropped;
    /// the frames around them keep their order.
    #[must_use]
    pub fn resolve_addresses(&self, addresses: &[u64]) -> Resolution {
        let mut resolution = Resolution::default();
        for &addr in addresses {
            match self.registry.lookup_by_address(addr) {
                Ok(function) => self.push(&mut resolution, function),
                Err(_) => resolution.misses += 1,
            }
        }
        resolution
    }

    fn push(&self, resolution: &mut Resolution, function: &Function) {
        if self.filter.is_reportable(self.registry, function) {
            resolution.frames.push(function.name.clone());
        } else {
            resolution.filtered += 1;
        }
    }
}
