//! Selection model: disjoint address ranges

use serde::{Deserialize, Serialize};

use crate::Address;

/// Half-open address range `[start, endex)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AddressRange {
    pub start: Address,
    pub endex: Address,
}

impl AddressRange {
    /// Creates a range, swapping reversed bounds
    pub fn new(start: Address, endex: Address) -> Self {
        if endex < start {
            Self {
                start: endex,
                endex: start,
            }
        } else {
            Self { start, endex }
        }
    }

    /// Range of `size` addresses from `start`, saturating at the top
    pub fn sized(start: Address, size: Address) -> Self {
        Self::new(start, start.saturating_add(size))
    }

    pub fn len(&self) -> Address {
        self.endex - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.endex
    }

    pub fn contains(&self, address: Address) -> bool {
        self.start <= address && address < self.endex
    }

    /// True when the ranges overlap or share a boundary
    pub fn touches(&self, other: &AddressRange) -> bool {
        self.start <= other.endex && other.start <= self.endex
    }
}

/// Ordered set of disjoint, non-touching ranges
///
/// An empty selection means "no scope": operations fall back to the cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    ranges: Vec<AddressRange>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ranges(ranges: impl IntoIterator<Item = AddressRange>) -> Self {
        let mut selection = Self::new();
        selection.set(ranges);
        selection
    }

    pub fn ranges(&self) -> &[AddressRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Number of selected addresses
    pub fn total_size(&self) -> Address {
        self.ranges.iter().map(|r| r.len()).sum()
    }

    pub fn contains(&self, address: Address) -> bool {
        let index = self.ranges.partition_point(|r| r.endex <= address);
        self.ranges
            .get(index)
            .map(|r| r.contains(address))
            .unwrap_or(false)
    }

    /// Bounding range of the whole selection
    pub fn span(&self) -> Option<AddressRange> {
        match (self.ranges.first(), self.ranges.last()) {
            (Some(first), Some(last)) => Some(AddressRange::new(first.start, last.endex)),
            _ => None,
        }
    }

    pub fn set(&mut self, ranges: impl IntoIterator<Item = AddressRange>) {
        self.ranges.clear();
        for range in ranges {
            self.add(range);
        }
    }

    /// Adds a range, merging it with any range it overlaps or touches
    pub fn add(&mut self, range: AddressRange) {
        if range.is_empty() {
            return;
        }
        let mut merged = range;
        let mut ranges = Vec::with_capacity(self.ranges.len() + 1);
        for existing in self.ranges.drain(..) {
            if existing.touches(&merged) {
                merged = AddressRange::new(
                    merged.start.min(existing.start),
                    merged.endex.max(existing.endex),
                );
            } else {
                ranges.push(existing);
            }
        }
        let index = ranges.partition_point(|r| r.start < merged.start);
        ranges.insert(index, merged);
        self.ranges = ranges;
        self.debug_check();
    }

    /// Removes a range, splitting any range it cuts through
    pub fn subtract(&mut self, range: AddressRange) {
        if range.is_empty() {
            return;
        }
        let mut ranges = Vec::with_capacity(self.ranges.len() + 1);
        for existing in self.ranges.drain(..) {
            if existing.endex <= range.start || existing.start >= range.endex {
                ranges.push(existing);
                continue;
            }
            if existing.start < range.start {
                ranges.push(AddressRange::new(existing.start, range.start));
            }
            if range.endex < existing.endex {
                ranges.push(AddressRange::new(range.endex, existing.endex));
            }
        }
        self.ranges = ranges;
        self.debug_check();
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    /// Keeps ranges anchored to their bytes after a structural edit at `pivot`
    ///
    /// A positive delta is an insertion of `delta` addresses, a negative one
    /// a deletion of `[pivot, pivot - delta)`.
    pub fn translate(&mut self, delta: i64, pivot: Address) {
        let size = delta.unsigned_abs();
        if delta > 0 {
            self.open_gap(pivot, size);
        } else if delta < 0 {
            self.close_gap(pivot, size);
        }
    }

    /// Insertion of `size` addresses at `pivot`; straddling ranges are split
    pub fn open_gap(&mut self, pivot: Address, size: Address) {
        if size == 0 {
            return;
        }
        let mut ranges = Vec::with_capacity(self.ranges.len() + 1);
        for range in self.ranges.drain(..) {
            if range.endex <= pivot {
                ranges.push(range);
            } else if range.start >= pivot {
                ranges.push(AddressRange::new(
                    range.start.saturating_add(size),
                    range.endex.saturating_add(size),
                ));
            } else {
                ranges.push(AddressRange::new(range.start, pivot));
                ranges.push(AddressRange::new(
                    pivot.saturating_add(size),
                    range.endex.saturating_add(size),
                ));
            }
        }
        ranges.retain(|r| !r.is_empty());
        self.ranges = ranges;
        self.debug_check();
    }

    /// Deletion of `[pivot, pivot + size)`; covered parts vanish
    pub fn close_gap(&mut self, pivot: Address, size: Address) {
        if size == 0 {
            return;
        }
        let gap_endex = pivot.saturating_add(size);
        let map = |address: Address| {
            if address <= pivot {
                address
            } else if address <= gap_endex {
                pivot
            } else {
                address - size
            }
        };
        let ranges: Vec<_> = self
            .ranges
            .drain(..)
            .map(|r| AddressRange::new(map(r.start), map(r.endex)))
            .collect();
        self.set(ranges);
    }

    /// Moves every range by a signed offset, dropping what falls below zero
    pub fn offset(&mut self, offset: i64) {
        let amount = offset.unsigned_abs();
        let ranges: Vec<_> = self
            .ranges
            .drain(..)
            .map(|r| {
                if offset >= 0 {
                    AddressRange::new(
                        r.start.saturating_add(amount),
                        r.endex.saturating_add(amount),
                    )
                } else {
                    AddressRange::new(
                        r.start.saturating_sub(amount),
                        r.endex.saturating_sub(amount),
                    )
                }
            })
            .collect();
        self.set(ranges);
    }

    fn debug_check(&self) {
        debug_assert!(
            self.ranges.iter().all(|r| !r.is_empty())
                && self.ranges.windows(2).all(|p| p[0].endex < p[1].start),
            "selection ranges must be sorted, disjoint and not touching"
        );
    }
}
