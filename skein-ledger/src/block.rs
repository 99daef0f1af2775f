use skein_crypto::hash::{blake3_hash, blake3_hash_multi};
use skein_types::ledger::{Block, Storage};
use skein_types::primitives::*;

use crate::error::LedgerError;

/// Build the block that follows `head`, carrying `storage` as its snapshot.
pub fn build_block(
    head: &Block,
    storage: Storage,
    origin: &str,
    timestamp: Timestamp,
) -> Result<Block, LedgerError> {
    let index = head
        .index
        .checked_add(1)
        .ok_or_else(|| LedgerError::InvalidBlock {
            index: head.index,
            reason: "ledger index exhausted".to_string(),
        })?;
    let mut block = Block {
        index,
        timestamp,
        origin: origin.to_string(),
        prev_hash: head.hash,
        hash: ZERO_HASH,
        storage,
    };
    block.hash = compute_block_hash(&block);
    Ok(block)
}

/// Compute a deterministic block hash from all fields except the hash itself.
pub fn compute_block_hash(block: &Block) -> Hash {
    // Storage is a BTreeMap, so its borsh encoding is canonical.
    let storage_hash = match borsh::to_vec(&block.storage) {
        Ok(bytes) => blake3_hash(&bytes),
        Err(_) => ZERO_HASH,
    };
    blake3_hash_multi(&[
        &block.index.to_le_bytes(),
        &block.timestamp.to_le_bytes(),
        &(block.origin.len() as u64).to_le_bytes(),
        block.origin.as_bytes(),
        &block.prev_hash,
        &storage_hash,
    ])
}

/// Verify that a block received from the network is internally consistent.
pub fn verify_block(block: &Block) -> Result<(), LedgerError> {
    if block.index == 0 {
        return Err(LedgerError::InvalidBlock {
            index: 0,
            reason: "genesis is never gossiped".to_string(),
        });
    }

    // Nothing could ever be committed after it.
    if block.index == u64::MAX {
        return Err(LedgerError::InvalidBlock {
            index: block.index,
            reason: "index leaves no room for a successor".to_string(),
        });
    }

    if block.hash != compute_block_hash(block) {
        return Err(LedgerError::InvalidBlock {
            index: block.index,
            reason: "block hash mismatch".to_string(),
        });
    }

    Ok(())
}

/// Remove every entry whose expiry is at or before `now`. Buckets left empty
/// are dropped. Returns the number of entries removed.
pub fn remove_expired(storage: &mut Storage, now: Timestamp) -> usize {
    let mut removed = 0;
    storage.retain(|_, bucket| {
        let before = bucket.len();
        bucket.retain(|_, entry| !entry.is_expired(now));
        removed += before - bucket.len();
        !bucket.is_empty()
    });
    removed
}
