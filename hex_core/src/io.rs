//! Bulk byte-range transfer to and from collaborators
//!
//! Loaders feed `(address, bytes)` ranges into
//! [`SparseMemory::from_blocks`] or [`crate::EditSession::import`]; savers and
//! format codecs receive the present content through a [`RangeSink`].

use std::convert::Infallible;

use crate::error::EngineError;
use crate::memory::SparseMemory;
use crate::Address;

/// Receives present byte ranges in ascending address order
pub trait RangeSink {
    type Error;

    fn store(&mut self, start: Address, data: &[u8]) -> Result<(), Self::Error>;
}

impl RangeSink for Vec<(Address, Vec<u8>)> {
    type Error = Infallible;

    fn store(&mut self, start: Address, data: &[u8]) -> Result<(), Self::Error> {
        self.push((start, data.to_vec()));
        Ok(())
    }
}

impl RangeSink for SparseMemory {
    type Error = EngineError;

    fn store(&mut self, start: Address, data: &[u8]) -> Result<(), Self::Error> {
        self.write(start, data)
    }
}

impl SparseMemory {
    /// Streams every block into `sink`; returns the number of ranges stored
    pub fn export_to<S: RangeSink + ?Sized>(&self, sink: &mut S) -> Result<usize, S::Error> {
        for block in self.blocks() {
            sink.store(block.start(), block.data())?;
        }
        Ok(self.block_count())
    }

    /// Streams only the content inside `[start, endex)`
    pub fn export_range<S: RangeSink + ?Sized>(
        &self,
        start: Address,
        endex: Address,
        sink: &mut S,
    ) -> Result<usize, S::Error> {
        self.extract(start, endex).export_to(sink)
    }
}
