//! Reversible memory operations
//!
//! Every mutation the session performs is described by an [`Operation`].
//! Applying one returns its exact inverse, which is what the edit log stores
//! for undo.

use serde::{Deserialize, Serialize};

use crate::cancel::{Interrupt, NeverInterrupt};
use crate::error::{EngineError, EngineResult};
use crate::memory::{Backup, SparseMemory};
use crate::selection::AddressRange;
use crate::Address;

/// A replayable mutation of [`SparseMemory`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Operation {
    /// Overwrite without shifting
    Write { address: Address, data: Vec<u8> },
    /// Shift up, then write
    Insert { address: Address, data: Vec<u8> },
    /// Shift up, leaving a gap
    Reserve { address: Address, size: Address },
    /// Remove and shift down
    Delete { address: Address, size: Address },
    /// Turn a range into a gap
    Clear { start: Address, endex: Address },
    Fill {
        start: Address,
        endex: Address,
        value: u8,
    },
    /// Fill only the gaps of a range
    FillGaps {
        start: Address,
        endex: Address,
        value: u8,
    },
    Crop { ranges: Vec<AddressRange> },
    Move {
        from: Address,
        size: Address,
        to: Address,
    },
    /// Move the whole content
    Shift { offset: i64 },
    /// Put captured ranges back
    Restore { backups: Vec<Backup> },
    /// Reopen a deleted range and restore its content
    Reinsert { backup: Backup },
    /// Several operations as one step
    Batch { operations: Vec<Operation> },
}

impl Operation {
    /// Applies the operation and returns its inverse
    ///
    /// Arguments are validated and backups captured before the memory is
    /// touched; `interrupt` is polled once per block during capture, or once
    /// per block to be moved for the shifting variants. A batch interrupted or
    /// failing between steps is rolled back before the error is returned.
    pub fn apply(
        &self,
        memory: &mut SparseMemory,
        interrupt: &dyn Interrupt,
    ) -> EngineResult<Operation> {
        match self {
            Operation::Write { address, data } => {
                let endex = memory.check_span(*address, data.len() as Address)?;
                let backup = memory.backup(*address, endex, interrupt)?;
                memory.write(*address, data)?;
                Ok(Operation::Restore {
                    backups: vec![backup],
                })
            }
            Operation::Insert { address, data } => {
                let size = data.len() as Address;
                memory.check_insert(*address, size)?;
                memory.poll_shifted(*address, interrupt)?;
                memory.insert(*address, data)?;
                Ok(Operation::Delete {
                    address: *address,
                    size,
                })
            }
            Operation::Reserve { address, size } => {
                memory.check_insert(*address, *size)?;
                memory.poll_shifted(*address, interrupt)?;
                memory.reserve(*address, *size)?;
                Ok(Operation::Delete {
                    address: *address,
                    size: *size,
                })
            }
            Operation::Delete { address, size } => {
                let endex = memory.check_span(*address, *size)?;
                let backup = memory.backup(*address, endex, interrupt)?;
                memory.delete(*address, *size)?;
                Ok(Operation::Reinsert { backup })
            }
            Operation::Clear { start, endex } => {
                memory.check_range(*start, *endex)?;
                let backup = memory.backup(*start, *endex, interrupt)?;
                memory.clear(*start, *endex)?;
                Ok(Operation::Restore {
                    backups: vec![backup],
                })
            }
            Operation::Fill {
                start,
                endex,
                value,
            } => {
                memory.check_range(*start, *endex)?;
                let backup = memory.backup(*start, *endex, interrupt)?;
                memory.fill(*start, *endex, *value)?;
                Ok(Operation::Restore {
                    backups: vec![backup],
                })
            }
            Operation::FillGaps {
                start,
                endex,
                value,
            } => {
                memory.check_range(*start, *endex)?;
                let backup = memory.backup(*start, *endex, interrupt)?;
                memory.fill_gaps(*start, *endex, *value)?;
                Ok(Operation::Restore {
                    backups: vec![backup],
                })
            }
            Operation::Crop { ranges } => {
                memory.check_ranges(ranges)?;
                let backups = memory
                    .crop_complement(ranges)
                    .into_iter()
                    .map(|gap| memory.backup(gap.start, gap.endex, interrupt))
                    .collect::<EngineResult<Vec<_>>>()?;
                memory.crop(ranges)?;
                Ok(Operation::Restore { backups })
            }
            Operation::Move { from, size, to } => {
                let source_endex = memory.check_span(*from, *size)?;
                let target_endex = memory.check_span(*to, *size)?;
                let backups = if *from < target_endex && *to < source_endex {
                    vec![memory.backup(
                        (*from).min(*to),
                        source_endex.max(target_endex),
                        interrupt,
                    )?]
                } else {
                    vec![
                        memory.backup(*from, source_endex, interrupt)?,
                        memory.backup(*to, target_endex, interrupt)?,
                    ]
                };
                memory.move_range(*from, *size, *to)?;
                Ok(Operation::Restore { backups })
            }
            Operation::Shift { offset } => {
                let inverse = offset
                    .checked_neg()
                    .ok_or_else(|| EngineError::invalid("shift offset out of range"))?;
                memory.check_shift(*offset)?;
                memory.poll_shifted(0, interrupt)?;
                memory.shift(*offset)?;
                Ok(Operation::Shift { offset: inverse })
            }
            Operation::Restore { backups } => {
                for backup in backups {
                    backup.fits(memory)?;
                }
                let current = backups
                    .iter()
                    .map(|b| memory.backup(b.start(), b.endex(), interrupt))
                    .collect::<EngineResult<Vec<_>>>()?;
                for backup in backups {
                    memory.restore(backup)?;
                }
                Ok(Operation::Restore { backups: current })
            }
            Operation::Reinsert { backup } => {
                backup.fits(memory)?;
                memory.check_insert(backup.start(), backup.size())?;
                memory.poll_shifted(backup.start(), interrupt)?;
                memory.reserve(backup.start(), backup.size())?;
                memory.restore(backup)?;
                Ok(Operation::Delete {
                    address: backup.start(),
                    size: backup.size(),
                })
            }
            Operation::Batch { operations } => {
                let mut inverses = Vec::with_capacity(operations.len());
                for operation in operations {
                    match operation.apply(memory, interrupt) {
                        Ok(inverse) => inverses.push(inverse),
                        Err(err) => {
                            rollback(memory, inverses);
                            return Err(err);
                        }
                    }
                }
                inverses.reverse();
                Ok(Operation::Batch {
                    operations: inverses,
                })
            }
        }
    }

    /// Structural effect on addresses: `(pivot, delta)` for each step
    pub fn address_shifts(&self) -> Vec<(Address, i64)> {
        match self {
            Operation::Insert { address, data } => vec![(*address, data.len() as i64)],
            Operation::Reserve { address, size } => vec![(*address, *size as i64)],
            Operation::Reinsert { backup } => vec![(backup.start(), backup.size() as i64)],
            Operation::Delete { address, size } => vec![(*address, -(*size as i64))],
            Operation::Batch { operations } => {
                operations.iter().flat_map(|op| op.address_shifts()).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Range worth showing after the operation, if any
    pub fn focus(&self) -> Option<AddressRange> {
        match self {
            Operation::Write { address, data } | Operation::Insert { address, data } => {
                Some(AddressRange::sized(*address, data.len() as Address))
            }
            Operation::Reserve { address, size } | Operation::Delete { address, size } => {
                Some(AddressRange::sized(*address, *size))
            }
            Operation::Clear { start, endex }
            | Operation::Fill { start, endex, .. }
            | Operation::FillGaps { start, endex, .. } => Some(AddressRange::new(*start, *endex)),
            Operation::Crop { ranges } => ranges.first().copied(),
            Operation::Move { to, size, .. } => Some(AddressRange::sized(*to, *size)),
            Operation::Shift { .. } => None,
            Operation::Restore { backups } => backups
                .iter()
                .map(|b| AddressRange::new(b.start(), b.endex()))
                .reduce(|a, b| AddressRange::new(a.start.min(b.start), a.endex.max(b.endex))),
            Operation::Reinsert { backup } => {
                Some(AddressRange::new(backup.start(), backup.endex()))
            }
            Operation::Batch { operations } => operations
                .iter()
                .filter_map(|op| op.focus())
                .reduce(|a, b| AddressRange::new(a.start.min(b.start), a.endex.max(b.endex))),
        }
    }

    /// Short human-readable label, used for menu text
    pub fn describe(&self) -> String {
        match self {
            Operation::Write { address, data } => {
                format!("Write {} at {:#010X}", bytes(data.len() as Address), address)
            }
            Operation::Insert { address, data } => {
                format!("Insert {} at {:#010X}", bytes(data.len() as Address), address)
            }
            Operation::Reserve { address, size } => {
                format!("Reserve {} at {:#010X}", bytes(*size), address)
            }
            Operation::Delete { address, size } => {
                format!("Delete {} at {:#010X}", bytes(*size), address)
            }
            Operation::Clear { start, endex } => {
                format!("Clear {} at {:#010X}", bytes(endex - start), start)
            }
            Operation::Fill {
                start,
                endex,
                value,
            } => format!(
                "Fill {} at {:#010X} with {:#04X}",
                bytes(endex - start),
                start,
                value
            ),
            Operation::FillGaps { start, endex, value } => format!(
                "Fill gaps of {} at {:#010X} with {:#04X}",
                bytes(endex - start),
                start,
                value
            ),
            Operation::Crop { ranges } => format!("Crop to {} range(s)", ranges.len()),
            Operation::Move { from, size, to } => format!(
                "Move {} from {:#010X} to {:#010X}",
                bytes(*size),
                from,
                to
            ),
            Operation::Shift { offset } => format!("Shift by {}", offset),
            Operation::Restore { backups } => format!("Restore {} range(s)", backups.len()),
            Operation::Reinsert { backup } => {
                format!("Reinsert {} at {:#010X}", bytes(backup.size()), backup.start())
            }
            Operation::Batch { operations } => format!("Batch of {} edit(s)", operations.len()),
        }
    }
}

fn bytes(count: Address) -> String {
    if count == 1 {
        "1 byte".into()
    } else {
        format!("{} bytes", count)
    }
}

/// Undoes already applied steps, newest first
fn rollback(memory: &mut SparseMemory, inverses: Vec<Operation>) {
    tracing::debug!(steps = inverses.len(), "batch_rollback");
    for inverse in inverses.into_iter().rev() {
        let replayed = inverse.apply(memory, &NeverInterrupt);
        debug_assert!(replayed.is_ok(), "rollback step failed: {:?}", replayed);
    }
}
