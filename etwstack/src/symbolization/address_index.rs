//! Address-range index for sampled stacks
//!
//! Sampling backends describe every compiled function body as a closed
//! interval `[begin, end]`. Stack walks then produce raw instruction
//! addresses that must be mapped back to the interval that contains them.
//!
//! Definitions arrive in bursts (a module load defines all of its functions)
//! and lookups arrive at sampling frequency, so inserts go to a small pending
//! buffer. [`AddressIndex::seal`] sorts only that buffer and merges it into
//! the sorted array in linear time before the next burst of lookups.
//!
//! ```text
//!   sorted by begin:   [10..50] [100..150] [120..130] [400..480]
//!   prefix max end:       50       150        150        480
//!
//!   lookup(125): partition_point(begin <= 125) = 3
//!                scan back from index 2 while max_end >= 125
//!                hits [120..130] and [100..150] -> newest definition wins
//! ```

use crate::domain::FunctionId;

/// Closed address interval of a compiled function body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange {
    pub begin: u64,
    pub end: u64,
}

impl AddressRange {
    /// Build a range, rejecting inverted bounds
    #[must_use]
    pub fn new(begin: u64, end: u64) -> Option<Self> {
        (begin <= end).then_some(Self { begin, end })
    }

    /// Check if an address falls within this range (both ends inclusive)
    #[must_use]
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.begin && addr <= self.end
    }
}

#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    range: AddressRange,
    function: FunctionId,
    /// Registry definition sequence; larger is newer
    seq: u64,
}

/// Sorted interval index with a pending insert buffer
///
/// Entries are never removed eagerly. A redefined function leaves its old
/// entry behind; callers pass an `is_current` predicate so lookups skip it,
/// and the next [`seal`](Self::seal) drops it.
#[derive(Debug, Default)]
pub struct AddressIndex {
    sorted: Vec<IndexEntry>,
    /// `max_end[i]` is the largest `end` among `sorted[..=i]`
    max_end: Vec<u64>,
    pending: Vec<IndexEntry>,
}

impl AddressIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a range for the next seal
    pub fn insert(&mut self, function: FunctionId, range: AddressRange, seq: u64) {
        self.pending.push(IndexEntry { range, function, seq });
    }

    /// Returns true when no inserts are waiting to be merged
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.pending.is_empty()
    }

    /// Number of entries, including pending and stale ones
    #[must_use]
    pub fn len(&self) -> usize {
        self.sorted.len() + self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Merge pending inserts into the sorted array and drop stale entries
    pub fn seal(&mut self, is_current: impl Fn(FunctionId, u64) -> bool) {
        if self.pending.is_empty() {
            return;
        }

        let mut pending = std::mem::take(&mut self.pending);
        pending.retain(|e| is_current(e.function, e.seq));
        pending.sort_unstable_by_key(Self::order);

        // Both sides are sorted; one linear merge keeps the array sorted
        let existing = std::mem::take(&mut self.sorted);
        let mut merged = Vec::with_capacity(existing.len() + pending.len());
        let mut existing = existing.into_iter().filter(|e| is_current(e.function, e.seq)).peekable();
        let mut pending = pending.into_iter().peekable();
        loop {
            let take_pending = match (existing.peek(), pending.peek()) {
                (Some(a), Some(b)) => Self::order(b) < Self::order(a),
                (None, Some(_)) => true,
                (Some(_), None) => false,
                (None, None) => break,
            };
            let next = if take_pending { pending.next() } else { existing.next() };
            merged.extend(next);
        }
        self.sorted = merged;

        self.max_end.clear();
        self.max_end.reserve(self.sorted.len());
        let mut running = 0;
        for entry in &self.sorted {
            running = running.max(entry.range.end);
            self.max_end.push(running);
        }
    }

    fn order(entry: &IndexEntry) -> (u64, u64) {
        (entry.range.begin, entry.seq)
    }

    /// Find the newest current function whose range contains `addr`
    pub fn lookup(&self, addr: u64, is_current: impl Fn(FunctionId, u64) -> bool) -> Option<FunctionId> {
        let mut best: Option<IndexEntry> = None;
        let mut consider = |entry: &IndexEntry| {
            if entry.range.contains(addr)
                && is_current(entry.function, entry.seq)
                && best.map_or(true, |b| entry.seq > b.seq)
            {
                best = Some(*entry);
            }
        };

        let upper = self.sorted.partition_point(|e| e.range.begin <= addr);
        for i in (0..upper).rev() {
            if self.max_end[i] < addr {
                break;
            }
            consider(&self.sorted[i]);
        }

        // Pending inserts are few; they are merged on the next seal
        for entry in &self.pending {
            consider(entry);
        }

        best.map(|e| e.function)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn always(_: FunctionId, _: u64) -> bool {
        true
    }

    fn range(begin: u64, end: u64) -> AddressRange {
        AddressRange::new(begin, end).unwrap()
    }

    #[test]
    fn test_address_range_contains_is_closed() {
        let r = range(0x1000, 0x2000);

        assert!(r.contains(0x1000));
        assert!(r.contains(0x1500));
        assert!(r.contains(0x2000));
        assert!(!r.contains(0x0FFF));
        assert!(!r.contains(0x2001));
    }

    #[test]
    fn test_inverted_range_rejected() {
        assert!(AddressRange::new(50, 10).is_none());
        assert!(AddressRange::new(10, 10).is_some());
    }

    #[test]
    fn test_lookup_sealed() {
        let mut index = AddressIndex::new();
        index.insert(FunctionId(1), range(100, 150), 1);
        index.insert(FunctionId(2), range(10, 50), 2);
        index.seal(always);

        assert!(index.is_sealed());
        assert_eq!(index.lookup(30, always), Some(FunctionId(2)));
        assert_eq!(index.lookup(120, always), Some(FunctionId(1)));
        assert_eq!(index.lookup(9999, always), None);
        assert_eq!(index.lookup(75, always), None);
    }

    #[test]
    fn test_lookup_sees_pending_before_seal() {
        let mut index = AddressIndex::new();
        index.insert(FunctionId(1), range(100, 150), 1);
        index.seal(always);
        index.insert(FunctionId(2), range(10, 50), 2);

        assert!(!index.is_sealed());
        assert_eq!(index.lookup(30, always), Some(FunctionId(2)));
        assert_eq!(index.lookup(100, always), Some(FunctionId(1)));
    }

    #[test]
    fn test_overlap_resolves_to_newest() {
        let mut index = AddressIndex::new();
        index.insert(FunctionId(1), range(100, 200), 1);
        index.insert(FunctionId(2), range(120, 130), 2);
        index.insert(FunctionId(3), range(110, 190), 3);
        index.seal(always);

        assert_eq!(index.lookup(125, always), Some(FunctionId(3)));
        assert_eq!(index.lookup(195, always), Some(FunctionId(1)));
    }

    #[test]
    fn test_scan_passes_short_ranges_to_reach_long_one() {
        let mut index = AddressIndex::new();
        index.insert(FunctionId(1), range(0, 1000), 1);
        for i in 0..50u64 {
            index.insert(FunctionId(10 + i), range(10 + i * 10, 15 + i * 10), 2 + i);
        }
        index.seal(always);

        // 18 sits between two short ranges but inside the long one
        assert_eq!(index.lookup(18, always), Some(FunctionId(1)));
        assert_eq!(index.lookup(12, always), Some(FunctionId(10)));
    }

    #[test]
    fn test_stale_entries_skipped_and_dropped() {
        let mut index = AddressIndex::new();
        index.insert(FunctionId(1), range(10, 50), 1);
        index.insert(FunctionId(1), range(300, 350), 2);
        let current = |f: FunctionId, seq: u64| f == FunctionId(1) && seq == 2;

        assert_eq!(index.lookup(30, current), None);
        assert_eq!(index.lookup(320, current), Some(FunctionId(1)));

        index.seal(current);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_repeated_seals_keep_order() {
        let mut index = AddressIndex::new();
        // Lazily defined functions interleave with lookups
        for (seq, begin) in [500u64, 100, 900, 300, 700, 200].into_iter().enumerate() {
            index.insert(FunctionId(begin), range(begin, begin + 50), seq as u64 + 1);
            index.seal(always);
            assert_eq!(index.lookup(begin + 25, always), Some(FunctionId(begin)));
        }

        for begin in [100u64, 200, 300, 500, 700, 900] {
            assert_eq!(index.lookup(begin, always), Some(FunctionId(begin)));
            assert_eq!(index.lookup(begin + 51, always), None);
        }
        assert_eq!(index.len(), 6);
    }

    #[test]
    fn test_many_functions_lookup() {
        let mut index = AddressIndex::new();
        for i in 0..1000u64 {
            index.insert(FunctionId(i), range(i * 100, i * 100 + 63), i);
        }
        index.seal(always);

        assert_eq!(index.lookup(42_010, always), Some(FunctionId(420)));
        assert_eq!(index.lookup(42_070, always), None);
        assert_eq!(index.lookup(99_963, always), Some(FunctionId(999)));
        assert_eq!(index.lookup(100_000, always), None);
    }
}
