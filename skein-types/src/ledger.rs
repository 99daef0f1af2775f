use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::primitives::{BlockIndex, Hash, Timestamp, ZERO_HASH};

/// A single value stored under a bucket/key pair.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Entry {
    /// Opaque value.
    pub value: String,
    /// When the entry was last written.
    pub last_updated: Timestamp,
    /// When the entry stops being visible. `None` never expires.
    pub expires_at: Option<Timestamp>,
}

impl Entry {
    /// Whether this entry is logically absent at `now`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// Key → entry mapping of one bucket.
pub type Bucket = BTreeMap<String, Entry>;

/// Bucket name → bucket. Ordered so that hashing is deterministic.
pub type Storage = BTreeMap<String, Bucket>;

/// An atomic, complete snapshot of the shared key/value state.
///
/// A block is never a diff: writing one key produces a new block that carries
/// every other entry forward unchanged.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Block {
    /// Position in the ledger. Strictly increasing.
    pub index: BlockIndex,
    /// When the block was committed.
    pub timestamp: Timestamp,
    /// Identity of the peer that committed the block.
    pub origin: String,
    /// Hash of the block this one was built on.
    pub prev_hash: Hash,
    /// BLAKE3 hash over every other field.
    pub hash: Hash,
    /// Full snapshot of the key/value state.
    pub storage: Storage,
}

impl Block {
    /// The implicit empty block every fresh ledger starts from.
    pub fn genesis() -> Self {
        Self {
            index: 0,
            timestamp: 0,
            origin: String::new(),
            prev_hash: ZERO_HASH,
            hash: ZERO_HASH,
            storage: Storage::new(),
        }
    }

    /// Look up a bucket, including expired entries.
    pub fn bucket(&self, name: &str) -> Option<&Bucket> {
        self.storage.get(name)
    }

    /// Look up a single entry, including expired ones.
    pub fn entry(&self, bucket: &str, key: &str) -> Option<&Entry> {
        self.storage.get(bucket).and_then(|b| b.get(key))
    }

    /// Total order used to pick a winner between competing blocks.
    ///
    /// Higher index wins; equal indices fall back to origin identity and then
    /// to the block hash so every replica picks the same block.
    pub fn order_key(&self) -> (BlockIndex, &str, &Hash) {
        (self.index, self.origin.as_str(), &self.hash)
    }

    /// Whether `self` should replace `head` as the latest block.
    pub fn supersedes(&self, head: &Block) -> bool {
        self.order_key() > head.order_key()
    }
}
