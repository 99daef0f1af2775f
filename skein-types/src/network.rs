use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::ledger::Block;
use crate::primitives::Timestamp;

/// Gossip payloads exchanged between ledger replicas.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum LedgerMessage {
    /// A freshly committed block.
    Block(Block),
    /// Periodic re-announcement of the sender's latest block, so that peers
    /// that joined after a write still converge. `sent_at` keeps repeated
    /// announcements of the same block distinct on the wire.
    Sync { block: Block, sent_at: Timestamp },
}

impl LedgerMessage {
    /// The block carried by this message.
    pub fn block(&self) -> &Block {
        match self {
            LedgerMessage::Block(block) => block,
            LedgerMessage::Sync { block, .. } => block,
        }
    }

    /// Consume the message, returning its block.
    pub fn into_block(self) -> Block {
        match self {
            LedgerMessage::Block(block) => block,
            LedgerMessage::Sync { block, .. } => block,
        }
    }
}
