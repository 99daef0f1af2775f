use std::sync::Arc;

use skein_types::ledger::Block;

use crate::error::StorageError;

/// Append-only log of committed ledger blocks.
///
/// Blocks are shared as `Arc<Block>` so that handing out the latest snapshot
/// never deep-copies the storage map. Appends must never move the head index
/// backwards; an append at the head's index (a tie-break replacement) is
/// allowed.
pub trait BlockStore: Send + Sync {
    fn append(&self, block: Arc<Block>) -> Result<(), StorageError>;
    fn last(&self) -> Result<Option<Arc<Block>>, StorageError>;
    fn len(&self) -> Result<usize, StorageError>;

    fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}

/// Blanket implementation of BlockStore for `Arc<S>` so that a store can be
/// shared across multiple owners (e.g. a node and its tests).
impl<S: BlockStore + ?Sized> BlockStore for Arc<S> {
    fn append(&self, block: Arc<Block>) -> Result<(), StorageError> {
        (**self).append(block)
    }

    fn last(&self) -> Result<Option<Arc<Block>>, StorageError> {
        (**self).last()
    }

    fn len(&self) -> Result<usize, StorageError> {
        (**self).len()
    }
}

/// Blanket implementation of BlockStore for `Box<dyn BlockStore>` so that a
/// type-erased store can be used wherever a concrete store is expected.
impl BlockStore for Box<dyn BlockStore> {
    fn append(&self, block: Arc<Block>) -> Result<(), StorageError> {
        (**self).append(block)
    }

    fn last(&self) -> Result<Option<Arc<Block>>, StorageError> {
        (**self).last()
    }

    fn len(&self) -> Result<usize, StorageError> {
        (**self).len()
    }
}
