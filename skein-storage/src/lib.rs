//! Storage abstraction for the skein ledger.
//!
//! Provides the [`BlockStore`](traits::BlockStore) contract the ledger appends
//! committed blocks to, plus an in-memory backend. Durable backends live
//! outside this workspace and only need to honour the same contract.

pub mod error;
pub mod memory;
pub mod traits;
