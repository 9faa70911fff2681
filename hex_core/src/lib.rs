//! # Hex Core
//!
//! Editing engine for sparse binary images.
//!
//! ## Philosophy
//!
//! - **Sparse first**: Only present bytes are stored; everything else is a gap
//! - **Atomic edits**: An operation is fully applied and logged, or not at all
//! - **Reversible**: Every edit carries its exact inverse for undo
//! - **Mechanism over policy**: Core provides editing primitives, hosts decide rendering
//! - **No ambient state**: A session owns its document, history and selection
//!
//! ## Design
//!
//! The core provides:
//! - SparseMemory: Ordered, merged blocks over a bounded address space
//! - Operation: Replayable mutations that return their inverse
//! - EditLog: Bounded linear undo/redo with dirty tracking
//! - Selection: Disjoint address ranges that follow structural edits
//! - Search: Byte, masked, wildcard and gap matchers across block boundaries
//! - EditSession: The command/query boundary for front ends
//! - SessionSnapshot: Deterministic state for parity testing

pub mod block;
pub mod cancel;
pub mod config;
pub mod error;
pub mod history;
pub mod io;
pub mod memory;
pub mod operation;
pub mod search;
pub mod selection;
pub mod session;
pub mod snapshot;

/// Offset into the virtual address space
pub type Address = u64;

pub use block::Block;
pub use cancel::{CancelToken, Interrupt, NeverInterrupt};
pub use config::{EngineConfig, FloodMode, DEFAULT_ADDRESS_LIMIT, DEFAULT_MAX_HISTORY};
pub use error::{EngineError, EngineResult};
pub use history::{EditLog, Entry};
pub use io::RangeSink;
pub use memory::{Backup, Contiguity, EqualSpan, SparseMemory};
pub use operation::Operation;
pub use search::{Direction, Matcher, Pattern, Replacement};
pub use selection::{AddressRange, Selection};
pub use session::EditSession;
pub use snapshot::SessionSnapshot;
