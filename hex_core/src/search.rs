//! Pattern search across blocks and gaps
//!
//! A [`Pattern`] is a sequence of per-address matchers. Matching works on
//! the logical cell view of the memory, so a pattern may span several
//! blocks and the gaps between them. Candidate positions are enumerated
//! block by block: when the pattern contains a matcher that needs a present
//! byte, only addresses that put that matcher on a present byte are tried;
//! a pattern made only of unset matchers is looked up in the gap list.

use serde::{Deserialize, Serialize};

use crate::cancel::Interrupt;
use crate::error::{EngineError, EngineResult};
use crate::memory::SparseMemory;
use crate::operation::Operation;
use crate::selection::AddressRange;
use crate::Address;

/// Matches one cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Matcher {
    /// Exactly this byte
    Byte(u8),
    /// A byte whose masked bits equal `value`'s
    Masked { value: u8, mask: u8 },
    /// Any present byte
    Any,
    /// Only a gap
    Unset,
}

impl Matcher {
    pub fn matches(&self, cell: Option<u8>) -> bool {
        match (self, cell) {
            (Matcher::Byte(byte), Some(value)) => *byte == value,
            (Matcher::Masked { value, mask }, Some(cell)) => cell & mask == value & mask,
            (Matcher::Any, Some(_)) => true,
            (Matcher::Unset, None) => true,
            _ => false,
        }
    }

    /// True for matchers that only accept present bytes
    pub fn needs_byte(&self) -> bool {
        !matches!(self, Matcher::Unset)
    }
}

/// Non-empty sequence of matchers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pattern {
    matchers: Vec<Matcher>,
}

impl Pattern {
    pub fn new(matchers: Vec<Matcher>) -> EngineResult<Self> {
        if matchers.is_empty() {
            return Err(EngineError::invalid("empty search pattern"));
        }
        Ok(Self { matchers })
    }

    pub fn from_bytes(bytes: &[u8]) -> EngineResult<Self> {
        Self::new(bytes.iter().map(|&b| Matcher::Byte(b)).collect())
    }

    /// Parses whitespace-separated tokens of two characters each
    ///
    /// `BB` is a byte, `??` any byte, `--` a gap, and a single `?` in either
    /// nibble masks that nibble out (`A?`, `?5`).
    pub fn parse(text: &str) -> EngineResult<Self> {
        let matchers = text
            .split_whitespace()
            .map(parse_token)
            .collect::<EngineResult<Vec<_>>>()?;
        Self::new(matchers)
    }

    pub fn matchers(&self) -> &[Matcher] {
        &self.matchers
    }

    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    /// Index of the first matcher that needs a present byte
    fn anchor(&self) -> Option<usize> {
        self.matchers.iter().position(|m| m.needs_byte())
    }

    /// True when the pattern matches at `address`
    pub fn matches_at(&self, memory: &SparseMemory, address: Address) -> bool {
        self.matchers.iter().enumerate().all(|(offset, matcher)| {
            address
                .checked_add(offset as Address)
                .map(|a| matcher.matches(memory.peek(a)))
                .unwrap_or(false)
        })
    }
}

fn parse_token(token: &str) -> EngineResult<Matcher> {
    let invalid = || EngineError::invalid(format!("invalid pattern token {:?}", token));
    let chars: Vec<char> = token.chars().collect();
    if chars.len() != 2 {
        return Err(invalid());
    }
    match (chars[0], chars[1]) {
        ('?', '?') => Ok(Matcher::Any),
        ('-', '-') => Ok(Matcher::Unset),
        ('?', low) => {
            let low = low.to_digit(16).ok_or_else(invalid)? as u8;
            Ok(Matcher::Masked {
                value: low,
                mask: 0x0F,
            })
        }
        (high, '?') => {
            let high = high.to_digit(16).ok_or_else(invalid)? as u8;
            Ok(Matcher::Masked {
                value: high << 4,
                mask: 0xF0,
            })
        }
        (high, low) => {
            let high = high.to_digit(16).ok_or_else(invalid)? as u8;
            let low = low.to_digit(16).ok_or_else(invalid)? as u8;
            Ok(Matcher::Byte((high << 4) | low))
        }
    }
}

/// Scan direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Backward,
}

/// Finds the first match from `start` within the content span
///
/// Forward scans candidate starts `start, start + 1, ...`, backward scans
/// `start, start - 1, ...`. With `wrap`, the scan resumes from the opposite
/// end of the content and stops right before `start`.
pub fn find(
    memory: &SparseMemory,
    pattern: &Pattern,
    start: Address,
    direction: Direction,
    wrap: bool,
    interrupt: &dyn Interrupt,
) -> EngineResult<Address> {
    if memory.is_empty() {
        return Err(EngineError::NotFound);
    }
    let domain = AddressRange::new(memory.start(), memory.endex());

    let first = match direction {
        Direction::Forward => scan(
            memory,
            pattern,
            domain,
            start,
            Address::MAX,
            direction,
            interrupt,
        )?,
        Direction::Backward => scan(memory, pattern, domain, 0, start, direction, interrupt)?,
    };
    if let Some(found) = first {
        return Ok(found);
    }
    if !wrap {
        return Err(EngineError::NotFound);
    }

    let wrapped = match direction {
        Direction::Forward if start > 0 => {
            scan(memory, pattern, domain, 0, start - 1, direction, interrupt)?
        }
        Direction::Backward if start < Address::MAX => {
            scan(memory, pattern, domain, start + 1, Address::MAX, direction, interrupt)?
        }
        _ => None,
    };
    wrapped.ok_or(EngineError::NotFound)
}

/// All non-overlapping matches inside the scope ranges, ascending
pub fn find_all(
    memory: &SparseMemory,
    pattern: &Pattern,
    scope: &[AddressRange],
    interrupt: &dyn Interrupt,
) -> EngineResult<Vec<Address>> {
    let mut found = Vec::new();
    for window in scope {
        let mut from = window.start;
        while let Some(hit) = scan(
            memory,
            pattern,
            *window,
            from,
            Address::MAX,
            Direction::Forward,
            interrupt,
        )? {
            found.push(hit);
            from = hit + pattern.len() as Address;
        }
    }
    Ok(found)
}

/// Outcome of a replace-all pass
#[derive(Debug, Clone)]
pub struct Replacement {
    /// Start of every replaced match
    pub matches: Vec<Address>,
    /// The writes performed, as one step
    pub forward: Operation,
    /// Undoes all of them at once
    pub inverse: Operation,
}

/// Overwrites every match inside `scope` with `replacement`
///
/// Scanning resumes after each replacement at
/// `match + max(pattern length, replacement length)`, so replaced bytes are
/// never matched again. On error or interruption the writes already done
/// are rolled back.
pub fn replace_all(
    memory: &mut SparseMemory,
    pattern: &Pattern,
    replacement: &[u8],
    scope: &[AddressRange],
    interrupt: &dyn Interrupt,
) -> EngineResult<Replacement> {
    if replacement.is_empty() {
        return Err(EngineError::invalid("empty replacement"));
    }
    let stride = pattern.len().max(replacement.len()) as Address;
    let mut matches = Vec::new();
    let mut writes = Vec::new();
    let mut inverses = Vec::new();

    let outcome = (|| -> EngineResult<()> {
        for window in scope {
            let mut from = window.start;
            while let Some(hit) = scan(
                memory,
                pattern,
                *window,
                from,
                Address::MAX,
                Direction::Forward,
                interrupt,
            )? {
                let write = Operation::Write {
                    address: hit,
                    data: replacement.to_vec(),
                };
                inverses.push(write.apply(memory, interrupt)?);
                writes.push(write);
                matches.push(hit);
                from = match hit.checked_add(stride) {
                    Some(next) => next,
                    None => break,
                };
            }
        }
        Ok(())
    })();

    if let Err(err) = outcome {
        let undo = Operation::Batch {
            operations: inverses.into_iter().rev().collect(),
        };
        let rolled_back = undo.apply(memory, &crate::cancel::NeverInterrupt);
        debug_assert!(rolled_back.is_ok(), "replace rollback failed");
        return Err(err);
    }

    inverses.reverse();
    Ok(Replacement {
        matches,
        forward: Operation::Batch { operations: writes },
        inverse: Operation::Batch {
            operations: inverses,
        },
    })
}

/// Scans candidate starts in `[lo, hi]` whose match lies inside `window`
fn scan(
    memory: &SparseMemory,
    pattern: &Pattern,
    window: AddressRange,
    lo: Address,
    hi: Address,
    direction: Direction,
    interrupt: &dyn Interrupt,
) -> EngineResult<Option<Address>> {
    let size = pattern.len() as Address;
    if window.len() < size {
        return Ok(None);
    }
    let lo = lo.max(window.start);
    let hi = hi.min(window.endex - size);
    if lo > hi {
        return Ok(None);
    }

    match pattern.anchor() {
        Some(anchor) => scan_anchored(
            memory,
            pattern,
            anchor as Address,
            lo,
            hi,
            direction,
            interrupt,
        ),
        None => scan_gaps(memory, size, lo, hi, direction, interrupt),
    }
}

/// Candidates that put the anchor matcher on a present byte
fn scan_anchored(
    memory: &SparseMemory,
    pattern: &Pattern,
    anchor: Address,
    lo: Address,
    hi: Address,
    direction: Direction,
    interrupt: &dyn Interrupt,
) -> EngineResult<Option<Address>> {
    let Some(first) = lo.checked_add(anchor) else {
        return Ok(None);
    };
    let last = hi.saturating_add(anchor);
    let blocks = memory.blocks();
    let begin = blocks.partition_point(|b| b.endex() <= first);
    let end = blocks.partition_point(|b| b.start() <= last);
    if begin >= end {
        return Ok(None);
    }
    let in_range = &blocks[begin..end];

    match direction {
        Direction::Forward => {
            for block in in_range {
                interrupt.check()?;
                let from = block.start().max(first);
                let to = (block.endex() - 1).min(last);
                for address in from..=to {
                    let candidate = address - anchor;
                    if pattern.matches_at(memory, candidate) {
                        return Ok(Some(candidate));
                    }
                }
            }
        }
        Direction::Backward => {
            for block in in_range.iter().rev() {
                interrupt.check()?;
                let from = block.start().max(first);
                let to = (block.endex() - 1).min(last);
                for address in (from..=to).rev() {
                    let candidate = address - anchor;
                    if pattern.matches_at(memory, candidate) {
                        return Ok(Some(candidate));
                    }
                }
            }
        }
    }
    Ok(None)
}

/// Candidates for a pattern of unset matchers only: gaps long enough
fn scan_gaps(
    memory: &SparseMemory,
    size: Address,
    lo: Address,
    hi: Address,
    direction: Direction,
    interrupt: &dyn Interrupt,
) -> EngineResult<Option<Address>> {
    let gaps = memory.gaps(lo, hi.saturating_add(size));
    let fits = |gap: &AddressRange| gap.len() >= size;
    match direction {
        Direction::Forward => {
            for gap in gaps.iter() {
                interrupt.check()?;
                if fits(gap) {
                    return Ok(Some(gap.start));
                }
            }
        }
        Direction::Backward => {
            for gap in gaps.iter().rev() {
                interrupt.check()?;
                if fits(gap) {
                    return Ok(Some(gap.endex - size));
                }
            }
        }
    }
    Ok(None)
}
