use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use skein_types::network::LedgerMessage;

use crate::gossip::Gossip;
use crate::ledger::{Ledger, MergeOutcome};

/// Spawn the replication loop for `ledger`.
///
/// Merges every block received over `gossip` and re-announces the local head
/// every `sync_interval`. Exits once `shutdown` flips to `true` or its sender
/// is dropped.
pub fn spawn_sync(
    ledger: Arc<Ledger>,
    gossip: Arc<dyn Gossip>,
    sync_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let mut inbound = gossip.subscribe();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sync_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval = ?sync_interval, "ledger sync started");

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }

                received = inbound.recv() => match received {
                    Ok(message) => handle_message(&ledger, message).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "ledger sync lagging behind gossip");
                    }
                    Err(RecvError::Closed) => {
                        debug!("gossip channel closed");
                        break;
                    }
                },

                _ = ticker.tick() => {
                    ledger.announce(sync_interval).await;
                }
            }
        }

        info!("ledger sync stopped");
    })
}

async fn handle_message(ledger: &Ledger, message: LedgerMessage) {
    let block = message.into_block();
    let (index, origin) = (block.index, block.origin.clone());
    match ledger.merge(block).await {
        Ok(MergeOutcome::Accepted) => debug!(index, %origin, "merged remote block"),
        Ok(MergeOutcome::Stale) => {}
        Err(e) => warn!(index, %origin, "rejected remote block: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gossip::MemoryGossip;
    use skein_storage::memory::MemoryStore;
    use skein_types::ledger::Block;

    fn replica(origin: &str, hub: &MemoryGossip) -> Arc<Ledger> {
        Arc::new(
            Ledger::new(origin, Arc::new(MemoryStore::new()))
                .unwrap()
                .with_gossip(Arc::new(hub.clone())),
        )
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
        for _ in 0..200 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_write_replicates_to_peer() {
        let hub = MemoryGossip::default();
        let (_tx, shutdown) = watch::channel(false);
        let a = replica("peer-a", &hub);
        let b = replica("peer-b", &hub);
        spawn_sync(a.clone(), Arc::new(hub.clone()), Duration::from_secs(60), shutdown.clone());
        spawn_sync(b.clone(), Arc::new(hub.clone()), Duration::from_secs(60), shutdown);

        let before = a.index();
        a.persist(Duration::from_secs(1), Duration::from_secs(100), "t", "t", "test")
            .await
            .unwrap();
        assert_ne!(a.index(), before);

        assert!(wait_for(|| b.get_key("t", "t").as_deref() == Some("test")).await);
        assert_eq!(a.last_block().hash, b.last_block().hash);
    }

    #[tokio::test]
    async fn test_late_joiner_converges_from_announcement() {
        let hub = MemoryGossip::default();
        let (_tx, shutdown) = watch::channel(false);
        let a = replica("peer-a", &hub);
        a.persist(Duration::from_secs(1), Duration::from_secs(100), "b", "k", "v")
            .await
            .unwrap();

        // Joins after the write was published; only the periodic sync reaches it.
        let late = replica("peer-late", &hub);
        spawn_sync(late.clone(), Arc::new(hub.clone()), Duration::from_secs(60), shutdown.clone());
        spawn_sync(a.clone(), Arc::new(hub.clone()), Duration::from_millis(20), shutdown);

        assert!(wait_for(|| late.get_key("b", "k").is_some()).await);
    }

    #[tokio::test]
    async fn test_invalid_block_is_ignored() {
        let hub = MemoryGossip::default();
        let (_tx, shutdown) = watch::channel(false);
        let a = replica("peer-a", &hub);
        spawn_sync(a.clone(), Arc::new(hub.clone()), Duration::from_secs(60), shutdown);

        let mut forged = Block::genesis();
        forged.index = 7;
        hub.publish(LedgerMessage::Block(forged)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(a.index(), 0);
    }

    #[tokio::test]
    async fn test_stops_on_shutdown() {
        let hub = MemoryGossip::default();
        let (tx, shutdown) = watch::channel(false);
        let a = replica("peer-a", &hub);
        let handle = spawn_sync(a, Arc::new(hub), Duration::from_secs(60), shutdown);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sync loop did not stop")
            .unwrap();
    }
}
