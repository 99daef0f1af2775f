use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use skein_types::constants::DEFAULT_BLOCK_RETENTION;
use skein_types::ledger::Block;

use crate::error::StorageError;
use crate::traits::BlockStore;

/// In-memory block log holding the most recent `retention` blocks.
/// Positions are arrival order; `Block::index` is the ledger index.
pub struct MemoryStore {
    blocks: RwLock<VecDeque<Arc<Block>>>,
    retention: usize,
}

impl MemoryStore {
    /// Create a new empty in-memory store with the default retention.
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_BLOCK_RETENTION)
    }

    /// Create a store that keeps at most `retention` blocks (at least one).
    pub fn with_retention(retention: usize) -> Self {
        let retention = retention.max(1);
        Self {
            blocks: RwLock::new(VecDeque::with_capacity(retention)),
            retention,
        }
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    /// Snapshot of the retained blocks, oldest first.
    pub fn blocks(&self) -> Result<Vec<Arc<Block>>, StorageError> {
        let blocks = self.blocks.read().map_err(|e| StorageError::ReadError {
            reason: e.to_string(),
        })?;
        Ok(blocks.iter().cloned().collect())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockStore for MemoryStore {
    fn append(&self, block: Arc<Block>) -> Result<(), StorageError> {
        let mut blocks = self.blocks.write().map_err(|e| StorageError::WriteError {
            reason: e.to_string(),
        })?;
        if let Some(head) = blocks.back() {
            if block.index < head.index {
                return Err(StorageError::OutOfOrder {
                    index: block.index,
                    head: head.index,
                });
            }
        }
        blocks.push_back(block);
        while blocks.len() > self.retention {
            blocks.pop_front();
        }
        Ok(())
    }

    fn last(&self) -> Result<Option<Arc<Block>>, StorageError> {
        let blocks = self.blocks.read().map_err(|e| StorageError::ReadError {
            reason: e.to_string(),
        })?;
        Ok(blocks.back().cloned())
    }

    fn len(&self) -> Result<usize, StorageError> {
        let blocks = self.blocks.read().map_err(|e| StorageError::ReadError {
            reason: e.to_string(),
        })?;
        Ok(blocks.len())
    }
}
