use async_trait::async_trait;
use tokio::sync::broadcast;

use skein_types::network::LedgerMessage;

use crate::error::LedgerError;

/// Best-effort broadcast of ledger messages to connected peers.
///
/// Implementations give no ordering or delivery guarantee beyond "eventually
/// every connected peer receives every published message".
#[async_trait]
pub trait Gossip: Send + Sync {
    /// Publish a message to connected peers.
    async fn publish(&self, message: LedgerMessage) -> Result<(), LedgerError>;

    /// Subscribe to messages received from peers.
    fn subscribe(&self) -> broadcast::Receiver<LedgerMessage>;
}

/// In-process gossip hub. Every clone shares one channel, so ledgers holding
/// clones of the same hub replicate to each other (including echoes of their
/// own messages, which merge as stale).
#[derive(Debug, Clone)]
pub struct MemoryGossip {
    tx: broadcast::Sender<LedgerMessage>,
}

impl MemoryGossip {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }
}

impl Default for MemoryGossip {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Gossip for MemoryGossip {
    async fn publish(&self, message: LedgerMessage) -> Result<(), LedgerError> {
        // No subscribers is not a failure: gossip is best-effort.
        let _ = self.tx.send(message);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<LedgerMessage> {
        self.tx.subscribe()
    }
}
