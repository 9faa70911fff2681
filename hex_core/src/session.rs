//! Editing session: one document, its history and its selection
//!
//! [`EditSession`] is the command/query boundary a front end talks to. Every
//! mutation goes through a single commit path that applies an
//! [`Operation`], records it with its inverse in the [`EditLog`], keeps the
//! selection anchored to its bytes and moves the cursor.

use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::history::{EditLog, Entry};
use crate::memory::{Contiguity, SparseMemory};
use crate::operation::Operation;
use crate::search::{self, Direction, Pattern};
use crate::selection::{AddressRange, Selection};
use crate::snapshot::SessionSnapshot;
use crate::Address;

/// Editing state for one open document
#[derive(Debug)]
pub struct EditSession {
    memory: SparseMemory,
    log: EditLog,
    selection: Selection,
    cursor: Address,
    config: EngineConfig,
    cancel: CancelToken,
}

impl EditSession {
    /// Creates a session over an empty memory
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self {
            memory: SparseMemory::with_limit(config.address_limit),
            log: EditLog::new(config.max_history),
            selection: Selection::new(),
            cursor: 0,
            config,
            cancel: CancelToken::new(),
        })
    }

    /// Creates a session and loads `memory` into it
    pub fn with_memory(config: EngineConfig, memory: SparseMemory) -> EngineResult<Self> {
        let mut session = Self::new(config)?;
        session.load(memory)?;
        Ok(session)
    }

    pub fn memory(&self) -> &SparseMemory {
        &self.memory
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn history(&self) -> &EditLog {
        &self.log
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn cursor(&self) -> Address {
        self.cursor
    }

    pub fn set_cursor(&mut self, address: Address) -> EngineResult<()> {
        if address >= self.memory.limit() {
            return Err(EngineError::OutOfBounds {
                address,
                limit: self.memory.limit(),
            });
        }
        self.cursor = address;
        Ok(())
    }

    /// Handle another thread can use to interrupt the running operation
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn read(&self, start: Address, length: Address) -> Vec<(Address, Option<u8>)> {
        self.memory.read(start, length)
    }

    // Document lifecycle

    /// Replaces the document, dropping history and selection
    pub fn load(&mut self, memory: SparseMemory) -> EngineResult<()> {
        let memory = SparseMemory::from_blocks(
            self.config.address_limit,
            memory
                .blocks()
                .iter()
                .map(|b| (b.start(), b.data().to_vec())),
        )?;
        tracing::info!(
            blocks = memory.block_count(),
            bytes = memory.content_size(),
            "document_loaded"
        );
        self.cursor = memory.start();
        self.memory = memory;
        self.log.clear();
        self.selection.clear();
        Ok(())
    }

    /// Writes bulk ranges as one undoable step; later ranges win on overlap
    pub fn import<I>(&mut self, ranges: I) -> EngineResult<()>
    where
        I: IntoIterator<Item = (Address, Vec<u8>)>,
    {
        let operations: Vec<_> = ranges
            .into_iter()
            .filter(|(_, data)| !data.is_empty())
            .map(|(address, data)| Operation::Write { address, data })
            .collect();
        if operations.is_empty() {
            return Ok(());
        }
        let label = format!("Import {} range(s)", operations.len());
        self.commit_labeled(label, Operation::Batch { operations })
    }

    pub fn mark_saved(&mut self) {
        self.log.mark_saved();
    }

    pub fn is_dirty(&self) -> bool {
        self.log.is_dirty()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot::capture(self)
    }

    // Edits

    pub fn overwrite(&mut self, start: Address, data: &[u8]) -> EngineResult<()> {
        self.commit(Operation::Write {
            address: start,
            data: data.to_vec(),
        })
    }

    pub fn insert(&mut self, start: Address, data: &[u8]) -> EngineResult<()> {
        self.commit(Operation::Insert {
            address: start,
            data: data.to_vec(),
        })
    }

    pub fn delete(&mut self, start: Address, length: Address) -> EngineResult<()> {
        self.commit(Operation::Delete {
            address: start,
            size: length,
        })
    }

    pub fn reserve(&mut self, start: Address, size: Address) -> EngineResult<()> {
        self.commit(Operation::Reserve {
            address: start,
            size,
        })
    }

    pub fn clear(&mut self, start: Address, endex: Address) -> EngineResult<()> {
        self.commit(Operation::Clear { start, endex })
    }

    pub fn fill(&mut self, start: Address, endex: Address, value: u8) -> EngineResult<()> {
        self.commit(Operation::Fill {
            start,
            endex,
            value,
        })
    }

    pub fn fill_gaps(&mut self, start: Address, endex: Address, value: u8) -> EngineResult<()> {
        self.commit(Operation::FillGaps {
            start,
            endex,
            value,
        })
    }

    pub fn crop(&mut self, ranges: &[AddressRange]) -> EngineResult<()> {
        self.commit(Operation::Crop {
            ranges: ranges.to_vec(),
        })
    }

    pub fn move_range(&mut self, from: Address, length: Address, to: Address) -> EngineResult<()> {
        self.commit(Operation::Move {
            from,
            size: length,
            to,
        })
    }

    pub fn shift(&mut self, offset: i64) -> EngineResult<()> {
        self.commit(Operation::Shift { offset })
    }

    /// Overwrites the run of equal cells around `seed` with `value`
    ///
    /// The run follows the configured flood mode. A seed in a gap between
    /// blocks fills that gap; a seed outside the content is rejected.
    pub fn flood(
        &mut self,
        seed: Address,
        value: u8,
        contiguity: Contiguity,
    ) -> EngineResult<AddressRange> {
        self.cancel.reset();
        let span = self
            .memory
            .equal_span(seed, self.config.flood_mode, contiguity, &self.cancel)?
            .ok_or_else(|| {
                EngineError::invalid(format!("nothing to flood at {:#010X}", seed))
            })?;
        let range = AddressRange::new(span.start, span.endex);
        let label = format!(
            "Flood {} byte(s) at {:#010X} with {:#04X}",
            range.len(),
            range.start,
            value
        );
        self.commit_labeled(
            label,
            Operation::Fill {
                start: range.start,
                endex: range.endex,
                value,
            },
        )?;
        Ok(range)
    }

    // History

    pub fn undo(&mut self) -> EngineResult<()> {
        self.cancel.reset();
        let entry = self.log.undo_entry().ok_or(EngineError::NothingToUndo)?;
        entry.inverse().apply(&mut self.memory, &self.cancel)?;
        follow_structure(&mut self.selection, entry.inverse());
        self.cursor = self.landing(entry.inverse());
        tracing::debug!(label = entry.label(), "undo");
        self.log.step_back();
        Ok(())
    }

    pub fn redo(&mut self) -> EngineResult<()> {
        self.cancel.reset();
        let entry = self.log.redo_entry().ok_or(EngineError::NothingToRedo)?;
        entry.forward().apply(&mut self.memory, &self.cancel)?;
        follow_structure(&mut self.selection, entry.forward());
        self.cursor = self.landing(entry.forward());
        tracing::debug!(label = entry.label(), "redo");
        self.log.step_forward();
        Ok(())
    }

    pub fn can_undo(&self) -> bool {
        self.log.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.log.can_redo()
    }

    pub fn undo_description(&self) -> Option<String> {
        self.log.undo_description()
    }

    pub fn redo_description(&self) -> Option<String> {
        self.log.redo_description()
    }

    // Selection

    pub fn select_range(&mut self, start: Address, endex: Address) {
        self.selection.set([AddressRange::new(start, endex)]);
    }

    /// Selects the content bounds; an empty memory clears the selection
    pub fn select_all(&mut self) {
        if self.memory.is_empty() {
            self.selection.clear();
        } else {
            self.select_range(self.memory.start(), self.memory.endex());
        }
    }

    /// Selects the run of equal cells around `address`
    pub fn select_homogeneous(&mut self, address: Address) -> EngineResult<AddressRange> {
        self.cancel.reset();
        let span = self
            .memory
            .equal_span(
                address,
                self.config.flood_mode,
                Contiguity::Both,
                &self.cancel,
            )?
            .ok_or_else(|| EngineError::invalid(format!("no run at {:#010X}", address)))?;
        let range = AddressRange::new(span.start, span.endex);
        self.selection.set([range]);
        Ok(range)
    }

    pub fn add_selection(&mut self, range: AddressRange) {
        self.selection.add(range);
    }

    pub fn subtract_selection(&mut self, range: AddressRange) {
        self.selection.subtract(range);
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    /// Removes every selected range (or the cursor byte) and shifts down
    pub fn delete_selected(&mut self) -> EngineResult<()> {
        let ranges = self.scope();
        let size: Address = ranges.iter().map(|r| r.len()).sum();
        // Highest first, so lower addresses stay valid
        let operations = ranges
            .iter()
            .rev()
            .map(|r| Operation::Delete {
                address: r.start,
                size: r.len(),
            })
            .collect();
        self.commit_labeled(
            format!("Delete selection ({} byte(s))", size),
            Operation::Batch { operations },
        )
    }

    /// Turns every selected range (or the cursor byte) into a gap
    pub fn erase_selected(&mut self) -> EngineResult<()> {
        let operations = self
            .scope()
            .into_iter()
            .map(|r| Operation::Clear {
                start: r.start,
                endex: r.endex,
            })
            .collect();
        self.commit_labeled("Erase selection", Operation::Batch { operations })
    }

    pub fn fill_selected(&mut self, value: u8) -> EngineResult<()> {
        let operations = self
            .scope()
            .into_iter()
            .map(|r| Operation::Fill {
                start: r.start,
                endex: r.endex,
                value,
            })
            .collect();
        self.commit_labeled(
            format!("Fill selection with {:#04X}", value),
            Operation::Batch { operations },
        )
    }

    /// Keeps only the selected bytes; needs a non-empty selection
    pub fn crop_to_selection(&mut self) -> EngineResult<()> {
        if self.selection.is_empty() {
            return Err(EngineError::invalid("crop needs a selection"));
        }
        let ranges = self.selection.ranges().to_vec();
        self.commit_labeled("Crop to selection", Operation::Crop { ranges })
    }

    /// Opens a gap under every selected range (or the cursor byte)
    pub fn reserve_selected(&mut self) -> EngineResult<()> {
        let ranges = self.scope();
        let size: Address = ranges.iter().map(|r| r.len()).sum();
        let operations = ranges
            .iter()
            .rev()
            .map(|r| Operation::Reserve {
                address: r.start,
                size: r.len(),
            })
            .collect();
        self.commit_labeled(
            format!("Reserve selection ({} byte(s))", size),
            Operation::Batch { operations },
        )
    }

    /// Writes `value` into the gaps of every selected range (or the cursor byte)
    pub fn fill_gaps_selected(&mut self, value: u8) -> EngineResult<()> {
        let operations = self
            .scope()
            .into_iter()
            .map(|r| Operation::FillGaps {
                start: r.start,
                endex: r.endex,
                value,
            })
            .collect();
        self.commit_labeled(
            format!("Fill selection gaps with {:#04X}", value),
            Operation::Batch { operations },
        )
    }

    /// Moves the selected content (or the cursor byte) by a signed offset
    ///
    /// Each destination takes its source content exactly, gaps included.
    /// Sources not covered by a destination become unset. The selection
    /// and the cursor travel with the content.
    pub fn shift_selected(&mut self, offset: i64) -> EngineResult<()> {
        if offset == 0 {
            return Ok(());
        }
        let sources = self.scope();
        let mut targets = Vec::with_capacity(sources.len());
        for range in &sources {
            match (
                range.start.checked_add_signed(offset),
                range.endex.checked_add_signed(offset),
            ) {
                (Some(start), Some(endex)) => targets.push(AddressRange::new(start, endex)),
                _ => {
                    return Err(EngineError::invalid(format!(
                        "shift by {} would move {:#010X} outside the address space",
                        offset, range.start
                    )))
                }
            }
        }

        let fragments: Vec<_> = sources
            .iter()
            .flat_map(|r| self.memory.extract(r.start, r.endex).blocks().to_vec())
            .collect();
        let mut operations: Vec<_> = sources
            .iter()
            .chain(&targets)
            .map(|r| Operation::Clear {
                start: r.start,
                endex: r.endex,
            })
            .collect();
        for fragment in fragments {
            operations.push(Operation::Write {
                address: fragment.start().wrapping_add_signed(offset),
                data: fragment.into_data(),
            });
        }

        let cursor = self.cursor;
        self.commit_labeled(
            format!("Shift selection by {}", offset),
            Operation::Batch { operations },
        )?;
        self.cursor = cursor
            .saturating_add_signed(offset)
            .min(self.memory.limit() - 1);
        self.selection.offset(offset);
        Ok(())
    }

    /// Writes `chunk` at the selection start (or the cursor), keeping its gaps
    ///
    /// A selection is deleted first, as typing over it would. With `clear`
    /// the whole target span becomes unset before the chunk lands, so the
    /// chunk's gaps show through; otherwise they keep what was there.
    pub fn paste(&mut self, chunk: &SparseMemory, clear: bool) -> EngineResult<()> {
        if chunk.is_empty() {
            return Err(EngineError::invalid("nothing to paste"));
        }
        let target = self
            .selection
            .ranges()
            .first()
            .map(|r| r.start)
            .unwrap_or(self.cursor);
        let span = chunk.endex() - chunk.start();
        let target_endex = target.checked_add(span).ok_or(EngineError::OutOfBounds {
            address: Address::MAX,
            limit: self.memory.limit(),
        })?;

        let mut operations: Vec<_> = self
            .selection
            .ranges()
            .iter()
            .rev()
            .map(|r| Operation::Delete {
                address: r.start,
                size: r.len(),
            })
            .collect();
        if clear {
            operations.push(Operation::Clear {
                start: target,
                endex: target_endex,
            });
        }
        operations.extend(chunk.blocks().iter().map(|b| Operation::Write {
            address: target + (b.start() - chunk.start()),
            data: b.data().to_vec(),
        }));

        self.commit_labeled(
            format!("Paste {} byte(s)", chunk.content_size()),
            Operation::Batch { operations },
        )?;
        self.selection.clear();
        self.cursor = target_endex.min(self.memory.limit() - 1);
        Ok(())
    }

    // Search

    /// First match from `start`, wrapping when the configuration says so
    pub fn find(
        &self,
        pattern: &Pattern,
        start: Address,
        direction: Direction,
    ) -> EngineResult<Address> {
        self.cancel.reset();
        let result = search::find(
            &self.memory,
            pattern,
            start,
            direction,
            self.config.search_wrap,
            &self.cancel,
        );
        match &result {
            Ok(address) => tracing::debug!(address = *address, "search_hit"),
            Err(err) => tracing::debug!(start, error = %err, "search_miss"),
        }
        result
    }

    /// Matches inside the selection, or the whole content without one
    pub fn find_all(&self, pattern: &Pattern) -> EngineResult<Vec<Address>> {
        self.cancel.reset();
        search::find_all(&self.memory, pattern, &self.search_scope(), &self.cancel)
    }

    /// Replaces every match inside the search scope as one undo step
    ///
    /// Returns the replaced match addresses; no match records nothing.
    pub fn replace_all(
        &mut self,
        pattern: &Pattern,
        replacement: &[u8],
    ) -> EngineResult<Vec<Address>> {
        self.cancel.reset();
        let scope = self.search_scope();
        let replaced =
            match search::replace_all(&mut self.memory, pattern, replacement, &scope, &self.cancel)
            {
                Ok(replaced) => replaced,
                Err(err) => {
                    self.trace_failure("Replace all", &err);
                    return Err(err);
                }
            };
        if replaced.matches.is_empty() {
            return Ok(Vec::new());
        }
        let label = format!("Replace {} match(es)", replaced.matches.len());
        self.record(label, replaced.forward, replaced.inverse);
        Ok(replaced.matches)
    }

    // Internals

    fn commit(&mut self, forward: Operation) -> EngineResult<()> {
        let label = forward.describe();
        self.commit_labeled(label, forward)
    }

    fn commit_labeled(&mut self, label: impl Into<String>, forward: Operation) -> EngineResult<()> {
        let label = label.into();
        self.cancel.reset();
        match forward.apply(&mut self.memory, &self.cancel) {
            Ok(inverse) => {
                self.record(label, forward, inverse);
                Ok(())
            }
            Err(err) => {
                self.trace_failure(&label, &err);
                Err(err)
            }
        }
    }

    /// Bookkeeping for an operation already applied to the memory
    fn record(&mut self, label: String, forward: Operation, inverse: Operation) {
        follow_structure(&mut self.selection, &forward);
        self.cursor = self.landing(&forward);
        let focus = forward.focus();
        tracing::debug!(
            label = label.as_str(),
            start = focus.map(|r| r.start),
            endex = focus.map(|r| r.endex),
            "edit_committed"
        );
        self.log.record(Entry::new(label, forward, inverse));
    }

    fn trace_failure(&self, label: &str, err: &EngineError) {
        if *err == EngineError::Cancelled {
            tracing::info!(label, "edit_cancelled");
        } else {
            tracing::debug!(label, error = %err, "edit_rejected");
        }
    }

    /// Cursor position after `operation` was applied
    fn landing(&self, operation: &Operation) -> Address {
        let last = self.memory.limit() - 1;
        let address = match operation {
            Operation::Write { address, data } | Operation::Insert { address, data } => {
                address.saturating_add(data.len() as Address)
            }
            Operation::Shift { offset } if *offset >= 0 => {
                self.cursor.saturating_add(offset.unsigned_abs())
            }
            Operation::Shift { offset } => self.cursor.saturating_sub(offset.unsigned_abs()),
            _ => operation
                .focus()
                .map(|r| r.start)
                .unwrap_or(self.cursor),
        };
        address.min(last)
    }

    /// Selected ranges, or the cursor byte when nothing is selected
    fn scope(&self) -> Vec<AddressRange> {
        if self.selection.is_empty() {
            vec![AddressRange::sized(self.cursor, 1)]
        } else {
            self.selection.ranges().to_vec()
        }
    }

    fn search_scope(&self) -> Vec<AddressRange> {
        if !self.selection.is_empty() {
            self.selection.ranges().to_vec()
        } else if self.memory.is_empty() {
            Vec::new()
        } else {
            vec![AddressRange::new(self.memory.start(), self.memory.endex())]
        }
    }
}

/// Keeps the selection on its bytes across structural edits
fn follow_structure(selection: &mut Selection, operation: &Operation) {
    match operation {
        Operation::Shift { offset } => selection.offset(*offset),
        Operation::Batch { operations } => {
            for operation in operations {
                follow_structure(selection, operation);
            }
        }
        _ => {
            for (pivot, delta) in operation.address_shifts() {
                selection.translate(delta, pivot);
            }
        }
    }
}
