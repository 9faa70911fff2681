//! Sparse, gap-tolerant virtual memory
//!
//! The address space is mostly empty: only the bytes actually present are
//! stored, as an ordered list of [`Block`]s. Any address not covered by a
//! block reads as unset (`None`).
//!
//! ## Invariants
//!
//! After every public call:
//! - blocks are sorted by start address
//! - blocks never overlap nor touch (touching blocks are merged)
//! - blocks are never empty
//! - every block ends at or below the address limit
//!
//! Mutators validate their arguments first and only then touch the block
//! list, so a failing call leaves the memory unchanged.

use serde::{Deserialize, Serialize};

use crate::block::Block;
use crate::cancel::Interrupt;
use crate::config::{FloodMode, DEFAULT_ADDRESS_LIMIT};
use crate::error::{EngineError, EngineResult};
use crate::selection::AddressRange;
use crate::Address;

/// Content of a range captured before a mutation, gaps implicit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Backup {
    start: Address,
    endex: Address,
    blocks: Vec<Block>,
}

impl Backup {
    pub fn start(&self) -> Address {
        self.start
    }

    pub fn endex(&self) -> Address {
        self.endex
    }

    pub fn size(&self) -> Address {
        self.endex - self.start
    }

    /// Present fragments inside the range
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// True when the whole range was a gap
    pub fn is_gap(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Checks that restoring this backup into `memory` keeps its invariants
    ///
    /// The range must end at or below the memory's limit, and every block
    /// must be non-empty, sorted, disjoint and inside the range.
    pub fn fits(&self, memory: &SparseMemory) -> EngineResult<()> {
        if self.start > self.endex || self.endex > memory.limit {
            return Err(EngineError::invalid("backup does not fit this memory"));
        }
        let mut floor = self.start;
        for block in &self.blocks {
            let endex = block
                .start()
                .checked_add(block.len() as Address)
                .ok_or_else(|| EngineError::invalid("backup block overflows the address space"))?;
            if block.is_empty() || block.start() < floor || endex > self.endex {
                return Err(EngineError::invalid(format!(
                    "backup block at {:#x} is empty, unsorted or outside [{:#x}, {:#x})",
                    block.start(),
                    self.start,
                    self.endex
                )));
            }
            floor = endex;
        }
        Ok(())
    }
}

/// Direction(s) a flood run grows from its seed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Contiguity {
    /// From the seed upward only
    Forward,
    /// Both ways from the seed
    #[default]
    Both,
}

/// Maximal run of equal cells around a seed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EqualSpan {
    pub start: Address,
    pub endex: Address,
    /// Seed value; `None` for a gap
    pub value: Option<u8>,
}

impl EqualSpan {
    pub fn size(&self) -> Address {
        self.endex - self.start
    }
}

/// Sparse byte memory
#[derive(Debug, Clone)]
pub struct SparseMemory {
    blocks: Vec<Block>,
    limit: Address,
}

impl SparseMemory {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_ADDRESS_LIMIT)
    }

    /// Memory whose addresses must stay below `limit`
    pub fn with_limit(limit: Address) -> Self {
        Self {
            blocks: Vec::new(),
            limit,
        }
    }

    /// Builds a memory from bulk ranges; later ranges win where they overlap
    pub fn from_blocks<I>(limit: Address, ranges: I) -> EngineResult<Self>
    where
        I: IntoIterator<Item = (Address, Vec<u8>)>,
    {
        let mut memory = Self::with_limit(limit);
        for (start, data) in ranges {
            if data.is_empty() {
                continue;
            }
            memory.check_span(start, data.len() as Address)?;
            memory.write_raw(start, data);
        }
        memory.debug_check();
        Ok(memory)
    }

    pub fn limit(&self) -> Address {
        self.limit
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// First present address (0 when empty)
    pub fn start(&self) -> Address {
        self.blocks.first().map(|b| b.start()).unwrap_or(0)
    }

    /// One past the last present address (0 when empty)
    pub fn endex(&self) -> Address {
        self.blocks.last().map(|b| b.endex()).unwrap_or(0)
    }

    /// Number of present bytes
    pub fn content_size(&self) -> Address {
        self.blocks.iter().map(|b| b.len() as Address).sum()
    }

    /// Verifies the block invariants
    pub fn check_invariants(&self) -> bool {
        self.blocks
            .iter()
            .all(|b| !b.is_empty() && b.endex() <= self.limit)
            && self
                .blocks
                .windows(2)
                .all(|pair| pair[0].endex() < pair[1].start())
    }

    fn debug_check(&self) {
        debug_assert!(self.check_invariants(), "sparse memory invariant violated");
    }

    // Queries

    pub fn peek(&self, address: Address) -> Option<u8> {
        match self.index_at(address) {
            Ok(index) => self.blocks[index].get(address),
            Err(_) => None,
        }
    }

    /// One `(address, value)` pair per address of `[start, start + length)`
    pub fn read(&self, start: Address, length: Address) -> Vec<(Address, Option<u8>)> {
        self.read_values(start, length)
            .into_iter()
            .enumerate()
            .map(|(offset, value)| (start + offset as Address, value))
            .collect()
    }

    /// Values of `[start, start + length)`, `None` for gaps
    pub fn read_values(&self, start: Address, length: Address) -> Vec<Option<u8>> {
        let endex = start.saturating_add(length);
        let mut values = Vec::with_capacity((endex - start) as usize);
        let mut address = start;
        let mut index = self.blocks.partition_point(|b| b.endex() <= start);

        while address < endex {
            match self.blocks.get(index) {
                Some(block) if block.start() <= address => {
                    let stop = block.endex().min(endex);
                    let offset = (address - block.start()) as usize;
                    let size = (stop - address) as usize;
                    values.extend(block.data()[offset..offset + size].iter().map(|&b| Some(b)));
                    address = stop;
                    index += 1;
                }
                Some(block) => {
                    let stop = block.start().min(endex);
                    values.resize(values.len() + (stop - address) as usize, None);
                    address = stop;
                }
                None => {
                    values.resize(values.len() + (endex - address) as usize, None);
                    address = endex;
                }
            }
        }
        values
    }

    /// Captures `[start, endex)` for later restoration
    pub fn backup(
        &self,
        start: Address,
        endex: Address,
        interrupt: &dyn Interrupt,
    ) -> EngineResult<Backup> {
        if start > endex {
            return Err(EngineError::invalid("backup range is reversed"));
        }
        let mut blocks = Vec::new();
        let index = self.blocks.partition_point(|b| b.endex() <= start);
        for block in &self.blocks[index..] {
            if block.start() >= endex {
                break;
            }
            interrupt.check()?;
            if let Some(fragment) = block.clipped(start, endex) {
                blocks.push(fragment);
            }
        }
        Ok(Backup {
            start,
            endex,
            blocks,
        })
    }

    /// Copy of `[start, endex)` as a standalone memory, addresses preserved
    pub fn extract(&self, start: Address, endex: Address) -> SparseMemory {
        Self {
            blocks: self.clipped_blocks(start, endex),
            limit: self.limit,
        }
    }

    /// Unset sub-ranges of `[start, endex)`
    pub fn gaps(&self, start: Address, endex: Address) -> Vec<AddressRange> {
        let mut gaps = Vec::new();
        let mut cursor = start;
        let index = self.blocks.partition_point(|b| b.endex() <= start);
        for block in &self.blocks[index..] {
            if block.start() >= endex {
                break;
            }
            if block.start() > cursor {
                gaps.push(AddressRange::new(cursor, block.start()));
            }
            cursor = cursor.max(block.endex());
        }
        if cursor < endex {
            gaps.push(AddressRange::new(cursor, endex));
        }
        gaps
    }

    /// Maximal run of cells equal to the one at `seed`
    ///
    /// A present seed grows over equal bytes; with
    /// [`FloodMode::EqualOrUnset`] it also crosses gaps between blocks, but
    /// never past the first or last block. An unset seed yields its gap,
    /// or `None` when the seed lies outside the content.
    pub fn equal_span(
        &self,
        seed: Address,
        mode: FloodMode,
        contiguity: Contiguity,
        interrupt: &dyn Interrupt,
    ) -> EngineResult<Option<EqualSpan>> {
        let index = match self.index_at(seed) {
            Ok(index) => index,
            Err(index) => {
                if index == 0 || index == self.blocks.len() {
                    return Ok(None);
                }
                let start = match contiguity {
                    Contiguity::Forward => seed,
                    Contiguity::Both => self.blocks[index - 1].endex(),
                };
                return Ok(Some(EqualSpan {
                    start,
                    endex: self.blocks[index].start(),
                    value: None,
                }));
            }
        };

        let value = self.blocks[index].data()[(seed - self.blocks[index].start()) as usize];
        let crosses_gaps = mode == FloodMode::EqualOrUnset;

        let mut start = seed;
        if contiguity == Contiguity::Both {
            let mut i = index;
            loop {
                interrupt.check()?;
                let block = &self.blocks[i];
                let data = block.data();
                let mut offset = (start - block.start()) as usize;
                while offset > 0 && data[offset - 1] == value {
                    offset -= 1;
                }
                start = block.start() + offset as Address;
                if offset > 0 || !crosses_gaps || i == 0 {
                    break;
                }
                let prev = &self.blocks[i - 1];
                start = prev.endex();
                if prev.data()[prev.len() - 1] != value {
                    break;
                }
                i -= 1;
            }
        }

        let mut endex = seed + 1;
        let mut i = index;
        loop {
            interrupt.check()?;
            let block = &self.blocks[i];
            let data = block.data();
            let mut offset = (endex - block.start()) as usize;
            while offset < data.len() && data[offset] == value {
                offset += 1;
            }
            endex = block.start() + offset as Address;
            if offset < data.len() || !crosses_gaps || i + 1 == self.blocks.len() {
                break;
            }
            let next = &self.blocks[i + 1];
            endex = next.start();
            if next.data()[0] != value {
                break;
            }
            i += 1;
        }

        Ok(Some(EqualSpan {
            start,
            endex,
            value: Some(value),
        }))
    }

    // Block navigation

    /// Start of the block or gap holding `address` (`None` before the content)
    pub fn block_start_at(&self, address: Address) -> Option<Address> {
        match self.index_at(address) {
            Ok(index) => Some(self.blocks[index].start()),
            Err(0) => None,
            Err(index) => Some(self.blocks[index - 1].endex()),
        }
    }

    /// End of the block or gap holding `address` (`None` after the content)
    pub fn block_endex_at(&self, address: Address) -> Option<Address> {
        match self.index_at(address) {
            Ok(index) => Some(self.blocks[index].endex()),
            Err(index) => self.blocks.get(index).map(|b| b.start()),
        }
    }

    /// End of the nearest block entirely below the one holding `address`
    pub fn previous_block_endex(&self, address: Address) -> Option<Address> {
        let index = match self.index_at(address) {
            Ok(index) | Err(index) => index,
        };
        index.checked_sub(1).map(|i| self.blocks[i].endex())
    }

    /// Start of the nearest block entirely above the one holding `address`
    pub fn next_block_start(&self, address: Address) -> Option<Address> {
        let index = match self.index_at(address) {
            Ok(index) => index + 1,
            Err(index) => index,
        };
        self.blocks.get(index).map(|b| b.start())
    }

    // Validation

    /// Validates a non-empty span and returns its exclusive end
    pub(crate) fn check_span(&self, start: Address, size: Address) -> EngineResult<Address> {
        if size == 0 {
            return Err(EngineError::invalid("empty range"));
        }
        let endex = start.checked_add(size).ok_or(EngineError::OutOfBounds {
            address: Address::MAX,
            limit: self.limit,
        })?;
        if endex > self.limit {
            return Err(EngineError::OutOfBounds {
                address: endex,
                limit: self.limit,
            });
        }
        Ok(endex)
    }

    pub(crate) fn check_range(&self, start: Address, endex: Address) -> EngineResult<()> {
        if start >= endex {
            return Err(EngineError::invalid(format!(
                "empty or reversed range [{:#x}, {:#x})",
                start, endex
            )));
        }
        self.check_span(start, endex - start).map(|_| ())
    }

    /// Validates a gap of `size` opened at `address`
    pub(crate) fn check_insert(&self, address: Address, size: Address) -> EngineResult<()> {
        self.check_span(address, size)?;
        let content_endex = self.endex();
        if content_endex > address {
            self.check_span(content_endex, size)?;
        }
        Ok(())
    }

    pub(crate) fn check_ranges(&self, ranges: &[AddressRange]) -> EngineResult<()> {
        for range in ranges {
            self.check_range(range.start, range.endex)?;
        }
        if ranges.windows(2).any(|pair| pair[0].endex >= pair[1].start) {
            return Err(EngineError::invalid(
                "ranges must be sorted, disjoint and not touching",
            ));
        }
        Ok(())
    }

    pub(crate) fn check_shift(&self, offset: i64) -> EngineResult<()> {
        if self.blocks.is_empty() || offset == 0 {
            return Ok(());
        }
        let amount = offset.unsigned_abs();
        if offset > 0 {
            self.check_span(self.endex(), amount)?;
        } else if self.start() < amount {
            return Err(EngineError::invalid(format!(
                "shift by {} would move content below address zero",
                offset
            )));
        }
        Ok(())
    }

    /// Polls `interrupt` once per block a shift from `address` would move
    pub(crate) fn poll_shifted(
        &self,
        address: Address,
        interrupt: &dyn Interrupt,
    ) -> EngineResult<()> {
        let index = self.blocks.partition_point(|b| b.endex() <= address);
        for _ in &self.blocks[index..] {
            interrupt.check()?;
        }
        Ok(())
    }

    // Mutators

    /// Overwrites `data.len()` addresses from `start`, filling gaps
    pub fn write(&mut self, start: Address, data: &[u8]) -> EngineResult<()> {
        self.check_span(start, data.len() as Address)?;
        self.write_raw(start, data.to_vec());
        self.debug_check();
        Ok(())
    }

    /// Shifts everything at or above `start` up by `data.len()`, then writes
    pub fn insert(&mut self, start: Address, data: &[u8]) -> EngineResult<()> {
        let size = data.len() as Address;
        self.check_insert(start, size)?;
        self.reserve_raw(start, size);
        self.write_raw(start, data.to_vec());
        self.debug_check();
        Ok(())
    }

    /// Opens a gap of `size` addresses at `start`
    pub fn reserve(&mut self, start: Address, size: Address) -> EngineResult<()> {
        self.check_insert(start, size)?;
        self.reserve_raw(start, size);
        self.debug_check();
        Ok(())
    }

    /// Removes `[start, start + size)` and shifts everything above down
    pub fn delete(&mut self, start: Address, size: Address) -> EngineResult<()> {
        self.check_span(start, size)?;
        self.delete_raw(start, size);
        self.debug_check();
        Ok(())
    }

    /// Turns `[start, endex)` into a gap without shifting
    pub fn clear(&mut self, start: Address, endex: Address) -> EngineResult<()> {
        self.check_range(start, endex)?;
        self.clear_raw(start, endex);
        self.debug_check();
        Ok(())
    }

    /// Writes `value` at every address of `[start, endex)`
    pub fn fill(&mut self, start: Address, endex: Address, value: u8) -> EngineResult<()> {
        self.check_range(start, endex)?;
        self.write_raw(start, vec![value; (endex - start) as usize]);
        self.debug_check();
        Ok(())
    }

    /// Writes `value` only into the gaps of `[start, endex)`
    pub fn fill_gaps(&mut self, start: Address, endex: Address, value: u8) -> EngineResult<()> {
        self.check_range(start, endex)?;
        for gap in self.gaps(start, endex) {
            self.write_raw(gap.start, vec![value; gap.len() as usize]);
        }
        self.debug_check();
        Ok(())
    }

    /// Keeps only the bytes inside `ranges`; addresses do not move
    pub fn crop(&mut self, ranges: &[AddressRange]) -> EngineResult<()> {
        self.check_ranges(ranges)?;
        for gap in self.crop_complement(ranges) {
            self.clear_raw(gap.start, gap.endex);
        }
        self.debug_check();
        Ok(())
    }

    /// Relocates `[from, from + size)` to `to`
    ///
    /// The destination range takes the source content exactly, gaps
    /// included; source addresses not covered by the destination become
    /// unset. The source is buffered first, so overlapping ranges are safe.
    pub fn move_range(&mut self, from: Address, size: Address, to: Address) -> EngineResult<()> {
        let endex = self.check_span(from, size)?;
        self.check_span(to, size)?;
        if from != to {
            let fragments = self.clipped_blocks(from, endex);
            self.clear_raw(from, endex);
            self.clear_raw(to, to + size);
            for fragment in fragments {
                let target = to + (fragment.start() - from);
                self.write_raw(target, fragment.into_data());
            }
        }
        self.debug_check();
        Ok(())
    }

    /// Moves the whole content by a signed offset
    pub fn shift(&mut self, offset: i64) -> EngineResult<()> {
        self.check_shift(offset)?;
        let amount = offset.unsigned_abs();
        for block in &mut self.blocks {
            let start = if offset >= 0 {
                block.start() + amount
            } else {
                block.start() - amount
            };
            block.set_start(start);
        }
        self.debug_check();
        Ok(())
    }

    /// Puts a captured range back exactly as it was
    pub fn restore(&mut self, backup: &Backup) -> EngineResult<()> {
        backup.fits(self)?;
        self.clear_raw(backup.start, backup.endex);
        for block in &backup.blocks {
            self.write_raw(block.start(), block.data().to_vec());
        }
        self.debug_check();
        Ok(())
    }

    // Internals

    /// `Ok(i)` when block `i` holds `address`, else `Err(i)` with `i` the
    /// first block above it
    fn index_at(&self, address: Address) -> Result<usize, usize> {
        let index = self.blocks.partition_point(|b| b.endex() <= address);
        match self.blocks.get(index) {
            Some(block) if block.start() <= address => Ok(index),
            _ => Err(index),
        }
    }

    /// Index of the first block starting at or above `address`
    fn lower_bound(&self, address: Address) -> usize {
        self.blocks.partition_point(|b| b.start() < address)
    }

    /// Ensures no block straddles `address`
    fn cut(&mut self, address: Address) {
        if let Ok(index) = self.index_at(address) {
            if self.blocks[index].start() < address {
                let tail = self.blocks[index].split_off(address);
                self.blocks.insert(index + 1, tail);
            }
        }
    }

    fn merge_around(&mut self, mut index: usize) {
        if index > 0 && self.blocks[index - 1].endex() == self.blocks[index].start() {
            let block = self.blocks.remove(index);
            index -= 1;
            self.blocks[index].append(block);
        }
        if index + 1 < self.blocks.len()
            && self.blocks[index].endex() == self.blocks[index + 1].start()
        {
            let block = self.blocks.remove(index + 1);
            self.blocks[index].append(block);
        }
    }

    fn clipped_blocks(&self, start: Address, endex: Address) -> Vec<Block> {
        let index = self.blocks.partition_point(|b| b.endex() <= start);
        self.blocks[index..]
            .iter()
            .take_while(|b| b.start() < endex)
            .filter_map(|b| b.clipped(start, endex))
            .collect()
    }

    /// Content sub-ranges a crop to `ranges` would clear
    pub(crate) fn crop_complement(&self, ranges: &[AddressRange]) -> Vec<AddressRange> {
        let (start, endex) = (self.start(), self.endex());
        let mut complement = Vec::new();
        let mut cursor = start;
        for range in ranges {
            let stop = range.start.min(endex);
            if cursor < stop {
                complement.push(AddressRange::new(cursor, stop));
            }
            cursor = cursor.max(range.endex);
        }
        if cursor < endex {
            complement.push(AddressRange::new(cursor, endex));
        }
        complement
    }

    fn clear_raw(&mut self, start: Address, endex: Address) {
        if start >= endex {
            return;
        }
        self.cut(start);
        self.cut(endex);
        let lo = self.lower_bound(start);
        let hi = self.lower_bound(endex);
        self.blocks.drain(lo..hi);
    }

    fn write_raw(&mut self, start: Address, data: Vec<u8>) {
        if data.is_empty() {
            return;
        }
        let endex = start + data.len() as Address;
        if let Ok(index) = self.index_at(start) {
            let block = &mut self.blocks[index];
            if endex <= block.endex() {
                let offset = (start - block.start()) as usize;
                block.data_mut()[offset..offset + data.len()].copy_from_slice(&data);
                return;
            }
        }
        self.clear_raw(start, endex);
        let index = self.lower_bound(start);
        self.blocks.insert(index, Block::new(start, data));
        self.merge_around(index);
    }

    fn reserve_raw(&mut self, start: Address, size: Address) {
        self.cut(start);
        let index = self.lower_bound(start);
        for block in &mut self.blocks[index..] {
            block.set_start(block.start() + size);
        }
    }

    fn delete_raw(&mut self, start: Address, size: Address) {
        self.clear_raw(start, start + size);
        let index = self.lower_bound(start);
        for block in &mut self.blocks[index..] {
            block.set_start(block.start() - size);
        }
        if index < self.blocks.len() {
            self.merge_around(index);
        }
    }
}

impl Default for SparseMemory {
    fn default() -> Self {
        Self::new()
    }
}

/// Two memories are equal when they hold the same bytes at the same addresses
impl PartialEq for SparseMemory {
    fn eq(&self, other: &Self) -> bool {
        self.limit == other.limit
            && self.blocks.len() == other.blocks.len()
            && self
                .blocks
                .iter()
                .zip(&other.blocks)
                .all(|(a, b)| a.start() == b.start() && a.data() == b.data())
    }
}

impl Eq for SparseMemory {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::{CountdownInterrupt, NeverInterrupt};

    fn memory_with(ranges: &[(Address, &[u8])]) -> SparseMemory {
        SparseMemory::from_blocks(
            DEFAULT_ADDRESS_LIMIT,
            ranges.iter().map(|(start, data)| (*start, data.to_vec())),
        )
        .unwrap()
    }

    fn layout(memory: &SparseMemory) -> Vec<(Address, Vec<u8>)> {
        memory
            .blocks()
            .iter()
            .map(|b| (b.start(), b.data().to_vec()))
            .collect()
    }

    #[test]
    fn test_empty_memory() {
        let memory = SparseMemory::new();
        assert!(memory.is_empty());
        assert_eq!(memory.start(), 0);
        assert_eq!(memory.endex(), 0);
        assert_eq!(memory.peek(5), None);
        assert!(memory.read(0, 0).is_empty());
    }

    #[test]
    fn test_write_into_gap() {
        let mut memory = SparseMemory::new();
        memory.write(10, &[0xAA, 0xBB]).unwrap();

        let values = memory.read_values(0, 15);
        assert_eq!(values.len(), 15);
        assert!(values[..10].iter().all(|v| v.is_none()));
        assert_eq!(values[10], Some(0xAA));
        assert_eq!(values[11], Some(0xBB));
        assert!(values[12..].iter().all(|v| v.is_none()));
    }

    #[test]
    fn test_read_pairs_addresses() {
        let memory = memory_with(&[(3, &[7])]);
        assert_eq!(memory.read(2, 3), vec![(2, None), (3, Some(7)), (4, None)]);
    }

    #[test]
    fn test_write_merges_touching_blocks() {
        let mut memory = memory_with(&[(0, &[1, 2]), (4, &[5, 6])]);
        assert_eq!(memory.block_count(), 2);

        memory.write(2, &[3, 4]).unwrap();
        assert_eq!(layout(&memory), vec![(0, vec![1, 2, 3, 4, 5, 6])]);
    }

    #[test]
    fn test_write_spanning_blocks_and_gaps() {
        let mut memory = memory_with(&[(0, &[1, 1]), (5, &[2, 2]), (10, &[3])]);
        memory.write(1, &[9; 6]).unwrap();
        assert_eq!(
            layout(&memory),
            vec![(0, vec![1, 9, 9, 9, 9, 9, 9]), (10, vec![3])]
        );
        assert!(memory.check_invariants());
    }

    #[test]
    fn test_write_inside_block() {
        let mut memory = memory_with(&[(0, &[1, 2, 3, 4])]);
        memory.write(1, &[8, 9]).unwrap();
        assert_eq!(layout(&memory), vec![(0, vec![1, 8, 9, 4])]);
    }

    #[test]
    fn test_write_rejects_empty_and_out_of_bounds() {
        let mut memory = SparseMemory::with_limit(16);
        assert!(matches!(
            memory.write(0, &[]),
            Err(EngineError::InvalidArgument(_))
        ));
        assert_eq!(
            memory.write(15, &[1, 2]),
            Err(EngineError::OutOfBounds {
                address: 17,
                limit: 16
            })
        );
        assert!(memory.is_empty());
    }

    #[test]
    fn test_insert_shifts_tail() {
        let mut memory = memory_with(&[(10, &[0xAA, 0xBB]), (20, &[1])]);
        memory.insert(11, &[0xCC]).unwrap();
        assert_eq!(
            layout(&memory),
            vec![(10, vec![0xAA, 0xCC, 0xBB]), (21, vec![1])]
        );
    }

    #[test]
    fn test_insert_in_gap_keeps_gap_structure() {
        let mut memory = memory_with(&[(0, &[1]), (10, &[2])]);
        memory.insert(5, &[7, 7]).unwrap();
        assert_eq!(
            layout(&memory),
            vec![(0, vec![1]), (5, vec![7, 7]), (12, vec![2])]
        );
    }

    #[test]
    fn test_insert_out_of_bounds_leaves_memory() {
        let mut memory = SparseMemory::with_limit(8);
        memory.write(6, &[1, 2]).unwrap();
        let before = memory.clone();
        assert!(matches!(
            memory.insert(0, &[0]),
            Err(EngineError::OutOfBounds { .. })
        ));
        assert_eq!(memory, before);
    }

    #[test]
    fn test_delete_shifts_down_and_merges() {
        let mut memory = memory_with(&[(0, &[1, 2]), (5, &[3, 4])]);
        memory.delete(2, 3).unwrap();
        assert_eq!(layout(&memory), vec![(0, vec![1, 2, 3, 4])]);
    }

    #[test]
    fn test_delete_inside_block() {
        let mut memory = memory_with(&[(0, &[1, 2, 3, 4, 5])]);
        memory.delete(1, 2).unwrap();
        assert_eq!(layout(&memory), vec![(0, vec![1, 4, 5])]);
    }

    #[test]
    fn test_reserve_opens_gap() {
        let mut memory = memory_with(&[(0, &[1, 2, 3])]);
        memory.reserve(1, 2).unwrap();
        assert_eq!(layout(&memory), vec![(0, vec![1]), (3, vec![2, 3])]);
    }

    #[test]
    fn test_clear_does_not_shift() {
        let mut memory = memory_with(&[(0, &[1, 2, 3, 4])]);
        memory.clear(1, 3).unwrap();
        assert_eq!(layout(&memory), vec![(0, vec![1]), (3, vec![4])]);
    }

    #[test]
    fn test_fill_and_fill_gaps() {
        let mut memory = memory_with(&[(2, &[5])]);
        memory.fill_gaps(0, 4, 0xFF).unwrap();
        assert_eq!(layout(&memory), vec![(0, vec![0xFF, 0xFF, 5, 0xFF])]);

        memory.fill(1, 3, 0).unwrap();
        assert_eq!(layout(&memory), vec![(0, vec![0xFF, 0, 0, 0xFF])]);
    }

    #[test]
    fn test_crop_keeps_addresses() {
        let mut memory = memory_with(&[(0, &[1, 2, 3, 4, 5, 6])]);
        memory
            .crop(&[AddressRange::new(1, 2), AddressRange::new(4, 6)])
            .unwrap();
        assert_eq!(layout(&memory), vec![(1, vec![2]), (4, vec![5, 6])]);
    }

    #[test]
    fn test_crop_rejects_unsorted_ranges() {
        let mut memory = memory_with(&[(0, &[1, 2, 3])]);
        let result = memory.crop(&[AddressRange::new(2, 3), AddressRange::new(0, 1)]);
        assert!(matches!(result, Err(EngineError::InvalidArgument(_))));
        assert_eq!(layout(&memory), vec![(0, vec![1, 2, 3])]);
    }

    #[test]
    fn test_move_non_overlapping() {
        let mut memory = memory_with(&[(0, &[1, 2, 3])]);
        memory.move_range(0, 3, 10).unwrap();
        assert_eq!(layout(&memory), vec![(10, vec![1, 2, 3])]);
    }

    #[test]
    fn test_move_overlapping_up_and_down() {
        let mut memory = memory_with(&[(0, &[1, 2, 3, 4])]);
        memory.move_range(0, 4, 2).unwrap();
        assert_eq!(layout(&memory), vec![(2, vec![1, 2, 3, 4])]);

        memory.move_range(2, 4, 1).unwrap();
        assert_eq!(layout(&memory), vec![(1, vec![1, 2, 3, 4])]);
    }

    #[test]
    fn test_move_carries_gaps() {
        let mut memory = memory_with(&[(0, &[1]), (2, &[3]), (10, &[9, 9, 9])]);
        memory.move_range(0, 3, 10).unwrap();
        assert_eq!(layout(&memory), vec![(10, vec![1]), (12, vec![3])]);
    }

    #[test]
    fn test_shift_bounds() {
        let mut memory = memory_with(&[(4, &[1])]);
        memory.shift(-4).unwrap();
        assert_eq!(memory.start(), 0);
        assert!(matches!(
            memory.shift(-1),
            Err(EngineError::InvalidArgument(_))
        ));
        memory.shift(16).unwrap();
        assert_eq!(memory.peek(16), Some(1));
    }

    #[test]
    fn test_backup_and_restore() {
        let mut memory = memory_with(&[(0, &[1, 2]), (4, &[5])]);
        let backup = memory.backup(1, 6, &NeverInterrupt).unwrap();
        assert_eq!(backup.blocks().len(), 2);

        memory.fill(0, 8, 0).unwrap();
        memory.restore(&backup).unwrap();
        assert_eq!(
            layout(&memory),
            vec![(0, vec![0, 2]), (4, vec![5]), (6, vec![0, 0])]
        );
    }

    #[test]
    fn test_restore_rejects_malformed_backups() {
        let mut memory = SparseMemory::with_limit(16);
        memory.write(0, &[1, 2, 3, 4]).unwrap();
        let before = memory.clone();

        let malformed = [
            r#"{"start":0,"endex":4,"blocks":[{"start":20,"data":[1]}]}"#,
            r#"{"start":0,"endex":4,"blocks":[{"start":1,"data":[]}]}"#,
            r#"{"start":0,"endex":4,"blocks":[{"start":2,"data":[1]},{"start":0,"data":[2]}]}"#,
            r#"{"start":0,"endex":4,"blocks":[{"start":2,"data":[1,2,3]}]}"#,
            r#"{"start":8,"endex":20,"blocks":[]}"#,
        ];
        for text in malformed {
            let backup: Backup = serde_json::from_str(text).unwrap();
            assert!(
                matches!(memory.restore(&backup), Err(EngineError::InvalidArgument(_))),
                "{}",
                text
            );
            assert_eq!(memory, before, "{}", text);
        }

        let valid: Backup =
            serde_json::from_str(r#"{"start":0,"endex":4,"blocks":[{"start":1,"data":[9]}]}"#)
                .unwrap();
        assert!(valid.fits(&memory).is_ok());
        memory.restore(&valid).unwrap();
        assert_eq!(layout(&memory), vec![(1, vec![9])]);
    }

    #[test]
    fn test_backup_cancelled() {
        let memory = memory_with(&[(0, &[1]), (2, &[2]), (4, &[3])]);
        let interrupt = CountdownInterrupt::new(1);
        assert_eq!(
            memory.backup(0, 5, &interrupt).unwrap_err(),
            EngineError::Cancelled
        );
    }

    #[test]
    fn test_equal_span_within_block() {
        let memory = memory_with(&[(0, &[1, 7, 7, 7, 7, 7, 2])]);
        let span = memory
            .equal_span(3, FloodMode::EqualValue, Contiguity::Both, &NeverInterrupt)
            .unwrap()
            .unwrap();
        assert_eq!((span.start, span.endex, span.value), (1, 6, Some(7)));

        let forward = memory
            .equal_span(3, FloodMode::EqualValue, Contiguity::Forward, &NeverInterrupt)
            .unwrap()
            .unwrap();
        assert_eq!((forward.start, forward.endex), (3, 6));
    }

    #[test]
    fn test_equal_span_crosses_gaps_when_allowed() {
        let memory = memory_with(&[(0, &[3, 7]), (4, &[7, 7]), (8, &[1])]);
        let strict = memory
            .equal_span(4, FloodMode::EqualValue, Contiguity::Both, &NeverInterrupt)
            .unwrap()
            .unwrap();
        assert_eq!((strict.start, strict.endex), (4, 6));

        let loose = memory
            .equal_span(4, FloodMode::EqualOrUnset, Contiguity::Both, &NeverInterrupt)
            .unwrap()
            .unwrap();
        assert_eq!((loose.start, loose.endex), (1, 8));
    }

    #[test]
    fn test_equal_span_gap_seed() {
        let memory = memory_with(&[(0, &[1]), (5, &[2])]);
        let span = memory
            .equal_span(3, FloodMode::EqualValue, Contiguity::Both, &NeverInterrupt)
            .unwrap()
            .unwrap();
        assert_eq!((span.start, span.endex, span.value), (1, 5, None));
        assert!(memory
            .equal_span(50, FloodMode::EqualValue, Contiguity::Both, &NeverInterrupt)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_block_navigation() {
        let memory = memory_with(&[(2, &[1, 1]), (8, &[2, 2])]);
        assert_eq!(memory.block_start_at(3), Some(2));
        assert_eq!(memory.block_start_at(5), Some(4));
        assert_eq!(memory.block_start_at(0), None);
        assert_eq!(memory.block_endex_at(3), Some(4));
        assert_eq!(memory.block_endex_at(5), Some(8));
        assert_eq!(memory.block_endex_at(20), None);
        assert_eq!(memory.previous_block_endex(9), Some(4));
        assert_eq!(memory.previous_block_endex(3), None);
        assert_eq!(memory.next_block_start(3), Some(8));
        assert_eq!(memory.next_block_start(9), None);
    }

    #[test]
    fn test_gaps_and_extract() {
        let memory = memory_with(&[(2, &[1, 2]), (6, &[3])]);
        assert_eq!(
            memory.gaps(0, 8),
            vec![
                AddressRange::new(0, 2),
                AddressRange::new(4, 6),
                AddressRange::new(7, 8)
            ]
        );

        let part = memory.extract(3, 7);
        assert_eq!(layout(&part), vec![(3, vec![2]), (6, vec![3])]);
    }

    #[test]
    fn test_from_blocks_last_write_wins() {
        let memory = memory_with(&[(0, &[1, 1, 1]), (1, &[2])]);
        assert_eq!(layout(&memory), vec![(0, vec![1, 2, 1])]);
        assert_eq!(memory.content_size(), 3);
    }
}
