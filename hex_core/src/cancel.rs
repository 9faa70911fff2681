//! Cooperative cancellation of long operations

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{EngineError, EngineResult};

/// Polled by long operations once per block
pub trait Interrupt {
    fn is_interrupted(&self) -> bool;

    /// Fails with `Cancelled` when interrupted
    fn check(&self) -> EngineResult<()> {
        if self.is_interrupted() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Interrupt that never fires (undo/redo replays, rollbacks)
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverInterrupt;

impl Interrupt for NeverInterrupt {
    fn is_interrupted(&self) -> bool {
        false
    }
}

/// Shared cancellation flag handed to the front end
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of the running operation
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

impl Interrupt for CancelToken {
    fn is_interrupted(&self) -> bool {
        self.is_cancelled()
    }
}

/// Fires after a fixed number of polls; used to exercise rollback paths
#[cfg(test)]
pub(crate) struct CountdownInterrupt {
    remaining: std::cell::Cell<usize>,
}

#[cfg(test)]
impl CountdownInterrupt {
    pub(crate) fn new(polls: usize) -> Self {
        Self {
            remaining: std::cell::Cell::new(polls),
        }
    }
}

#[cfg(test)]
impl Interrupt for CountdownInterrupt {
    fn is_interrupted(&self) -> bool {
        let left = self.remaining.get();
        if left == 0 {
            true
        } else {
            self.remaining.set(left - 1);
            false
        }
    }
}
