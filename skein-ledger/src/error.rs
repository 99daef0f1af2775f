use std::time::Duration;

use thiserror::Error;

/// Errors specific to the ledger layer.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger write timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("invalid block {index}: {reason}")]
    InvalidBlock { index: u64, reason: String },

    #[error("invalid write: {0}")]
    InvalidWrite(#[from] skein_types::error::TypeError),

    #[error("gossip error: {reason}")]
    GossipError { reason: String },

    #[error("storage error: {0}")]
    StorageError(#[from] skein_storage::error::StorageError),
}
