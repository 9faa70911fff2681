//! Session snapshot for deterministic parity testing

use serde::{Deserialize, Serialize};

use crate::session::EditSession;
use crate::Address;

/// Observable session state, comparable across sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub blocks: Vec<(Address, Vec<u8>)>,
    pub selection: Vec<(Address, Address)>,
    pub cursor: Address,
    pub undo_depth: usize,
    pub redo_depth: usize,
    pub dirty: bool,
}

impl SessionSnapshot {
    pub fn capture(session: &EditSession) -> Self {
        Self {
            blocks: session
                .memory()
                .blocks()
                .iter()
                .map(|b| (b.start(), b.data().to_vec()))
                .collect(),
            selection: session
                .selection()
                .ranges()
                .iter()
                .map(|r| (r.start, r.endex))
                .collect(),
            cursor: session.cursor(),
            undo_depth: session.history().undo_depth(),
            redo_depth: session.history().redo_depth(),
            dirty: session.is_dirty(),
        }
    }

    /// Compute a deterministic hash of the snapshot state
    #[cfg(test)]
    pub fn hash(&self) -> u64 {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();

        for (start, data) in &self.blocks {
            hasher.update(start.to_le_bytes());
            hasher.update((data.len() as u64).to_le_bytes());
            hasher.update(data);
        }
        hasher.update(b"|");
        for (start, endex) in &self.selection {
            hasher.update(start.to_le_bytes());
            hasher.update(endex.to_le_bytes());
        }
        hasher.update(self.cursor.to_le_bytes());
        hasher.update((self.undo_depth as u64).to_le_bytes());
        hasher.update((self.redo_depth as u64).to_le_bytes());
        hasher.update([self.dirty as u8]);

        let result = hasher.finalize();
        let bytes: [u8; 8] = result[..8].try_into().unwrap();
        u64::from_le_bytes(bytes)
    }
}
