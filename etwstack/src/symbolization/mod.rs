//! # Symbol Registry and Address Translation
//!
//! This module turns the runtime identifiers and raw instruction addresses
//! found in a trace back into source-level names. Unlike a native profiler,
//! there is no debug information to read: the monitored runtime tells us
//! about every module and function it creates, and this module remembers
//! what it was told.
//!
//! ## Two Kinds of Lookup
//!
//! ### By Id (instrumentation backend)
//!
//! The call hook reports `enter(function_id)` / `exit(function_id)` using the
//! same ids it used in the definition events, so resolution is a hash lookup.
//!
//! ### By Address (sampling backend)
//!
//! The sampler walks the native stack and reports return addresses. The
//! runtime emitted one `[begin, end]` interval per compiled function body,
//! so each address is resolved by interval containment:
//!
//! ```text
//! 1. Definitions arrive (module load)
//!    <module>  [100, 150]
//!    a         [ 10,  50]
//!
//! 2. A stack walk arrives, innermost first
//!    [30, 120, 9999]
//!
//! 3. Each address is matched against the intervals
//!    30   -> a
//!    120  -> <module>
//!    9999 -> no match (native frame, dropped)
//! ```
//!
//! ## Eventual Consistency
//!
//! Definitions may interleave with samples and with entry events from other
//! threads. Nothing here rejects an event because a related definition has
//! not arrived yet: a function whose module is unknown is kept under a
//! placeholder module, and ids that are unknown at resolution time are
//! skipped by the resolver rather than failing the stack.
//!
//! ## Module Structure
//!
//! - **`registry`**: Module/function records, id lookup, address lookup
//! - **`address_index`**: Sorted interval index used for address lookup
//!
//! ## Performance Considerations
//!
//! - **Batching**: New ranges are buffered and merged in one sort on
//!   [`SymbolRegistry::seal`]
//! - **Lookup**: `O(log N)` binary search plus a short backward scan bounded
//!   by a prefix maximum of interval ends

pub mod address_index;
pub mod registry;

pub use address_index::{AddressIndex, AddressRange};
pub use registry::{Function, Module, SymbolRegistry};
