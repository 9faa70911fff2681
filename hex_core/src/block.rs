//! Contiguous runs of present bytes

use core::cmp::Ordering;
use serde::{Deserialize, Serialize};

use crate::Address;

/// A contiguous run of present bytes starting at `start`
///
/// Blocks are never empty inside a [`SparseMemory`](crate::SparseMemory).
/// Equality and ordering compare the start address only, which is unique
/// among the blocks of one memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    start: Address,
    data: Vec<u8>,
}

impl Block {
    pub fn new(start: Address, data: Vec<u8>) -> Self {
        Self { start, data }
    }

    pub fn start(&self) -> Address {
        self.start
    }

    /// Exclusive end address
    pub fn endex(&self) -> Address {
        self.start + self.data.len() as Address
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn contains(&self, address: Address) -> bool {
        self.start <= address && address < self.endex()
    }

    pub fn get(&self, address: Address) -> Option<u8> {
        if self.contains(address) {
            Some(self.data[(address - self.start) as usize])
        } else {
            None
        }
    }

    /// Copy of the part of this block inside `[start, endex)`, if any
    pub fn clipped(&self, start: Address, endex: Address) -> Option<Block> {
        let lo = start.max(self.start);
        let hi = endex.min(self.endex());
        if lo >= hi {
            return None;
        }
        let offset = (lo - self.start) as usize;
        let size = (hi - lo) as usize;
        Some(Block::new(lo, self.data[offset..offset + size].to_vec()))
    }

    /// Splits at `address`, keeping `[start, address)` and returning the tail
    pub(crate) fn split_off(&mut self, address: Address) -> Block {
        debug_assert!(self.start < address && address < self.endex());
        let tail = self.data.split_off((address - self.start) as usize);
        Block::new(address, tail)
    }

    /// Appends a block that starts exactly at this block's end
    pub(crate) fn append(&mut self, mut other: Block) {
        debug_assert_eq!(self.endex(), other.start);
        self.data.append(&mut other.data);
    }

    pub(crate) fn set_start(&mut self, start: Address) {
        self.start = start;
    }

    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start
    }
}

impl Eq for Block {}

impl PartialOrd for Block {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Block {
    fn cmp(&self, other: &Self) -> Ordering {
        self.start.cmp(&other.start)
    }
}
