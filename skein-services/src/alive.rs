use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use skein_ledger::Ledger;
use skein_types::constants::{
    DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_SCRUB_INTERVAL, DEFAULT_STORE_TTL,
    DEFAULT_WRITE_TIMEOUT, LIVENESS_BUCKET,
};
use skein_types::primitives::{duration_millis, Timestamp};

use crate::error::ServiceError;

/// Timing of the liveness service.
#[derive(Debug, Clone)]
pub struct AliveConfig {
    /// How often this peer writes its heartbeat.
    pub heartbeat_interval: Duration,
    /// Bound on a single heartbeat or scrub write.
    pub write_timeout: Duration,
    /// Lifetime of a heartbeat record.
    pub store_ttl: Duration,
    /// How often expired records are physically removed.
    pub scrub_interval: Duration,
}

impl Default for AliveConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            store_ttl: DEFAULT_STORE_TTL,
            scrub_interval: DEFAULT_SCRUB_INTERVAL,
        }
    }
}

/// Keeps a heartbeat for this peer in the liveness bucket and scrubs
/// expired records out of the ledger.
pub struct AliveService {
    ledger: Arc<Ledger>,
    peer_id: String,
    config: AliveConfig,
}

impl AliveService {
    pub fn new(ledger: Arc<Ledger>, peer_id: impl Into<String>, config: AliveConfig) -> Self {
        Self {
            ledger,
            peer_id: peer_id.into(),
            config,
        }
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Write one heartbeat record for this peer.
    pub async fn heartbeat(&self) -> Result<(), ServiceError> {
        let now = self.ledger.now();
        self.ledger
            .persist(
                self.config.write_timeout,
                self.config.store_ttl,
                LIVENESS_BUCKET,
                &self.peer_id,
                &now.to_string(),
            )
            .await?;
        Ok(())
    }

    /// Run one scrub pass. Returns how many expired entries were removed.
    pub async fn scrub(&self) -> Result<usize, ServiceError> {
        Ok(self.ledger.scrub(self.config.write_timeout).await?)
    }

    /// Spawn the heartbeat and scrub loop.
    ///
    /// The first heartbeat is written immediately. Failed writes are logged
    /// and retried on the next tick. No write is attempted once `shutdown`
    /// is set.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval);
            heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut scrub = tokio::time::interval_at(
                Instant::now() + self.config.scrub_interval,
                self.config.scrub_interval,
            );
            scrub.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(peer = %self.peer_id, "liveness service started");

            loop {
                tokio::select! {
                    biased;

                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }

                    _ = heartbeat.tick() => {
                        if *shutdown.borrow() {
                            break;
                        }
                        if let Err(e) = self.heartbeat().await {
                            warn!("heartbeat failed: {e}");
                        }
                    }

                    _ = scrub.tick() => {
                        if *shutdown.borrow() {
                            break;
                        }
                        match self.scrub().await {
                            Ok(0) => {}
                            Ok(removed) => debug!(removed, "scrubbed ledger"),
                            Err(e) => warn!("scrub failed: {e}"),
                        }
                    }
                }
            }

            info!("liveness service stopped");
        })
    }
}

/// Peers with a live heartbeat written within `query_ttl` of now.
pub fn available_nodes(ledger: &Ledger, query_ttl: Duration) -> Vec<String> {
    available_nodes_at(ledger, query_ttl, ledger.now())
}

/// [`available_nodes`] evaluated at `now`.
pub fn available_nodes_at(ledger: &Ledger, query_ttl: Duration, now: Timestamp) -> Vec<String> {
    let window = duration_millis(query_ttl);
    ledger
        .current_entries(LIVENESS_BUCKET)
        .into_iter()
        .filter(|(_, entry)| now.saturating_sub(entry.last_updated) <= window)
        .map(|(peer, _)| peer)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_ledger::clock::ManualClock;
    use skein_storage::memory::MemoryStore;

    const QUERY_TTL: Duration = Duration::from_secs(15 * 60);

    fn scenario_config() -> AliveConfig {
        AliveConfig {
            heartbeat_interval: Duration::from_secs(2),
            write_timeout: Duration::from_secs(4),
            store_ttl: Duration::from_secs(15),
            scrub_interval: Duration::from_secs(4),
        }
    }

    fn ledger(clock: Arc<ManualClock>) -> Arc<Ledger> {
        Arc::new(
            Ledger::new("self", Arc::new(MemoryStore::new()))
                .unwrap()
                .with_clock(clock),
        )
    }

    /// Move both the ledger clock and tokio's paused clock forward one
    /// second at a time so background ticks interleave with expiry.
    async fn advance(clock: &ManualClock, secs: u64) {
        for _ in 0..secs {
            clock.advance(Duration::from_secs(1));
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    #[tokio::test]
    async fn test_heartbeat_marks_peer_available() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let ledger = ledger(clock.clone());
        let alive = AliveService::new(ledger.clone(), "peer-a", scenario_config());

        alive.heartbeat().await.unwrap();
        assert_eq!(available_nodes(&ledger, QUERY_TTL), vec!["peer-a"]);
        assert_eq!(ledger.index(), 1);
    }

    #[tokio::test]
    async fn test_expired_heartbeat_is_not_available_before_scrub() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let ledger = ledger(clock.clone());
        let alive = AliveService::new(ledger.clone(), "peer-a", scenario_config());

        alive.heartbeat().await.unwrap();
        clock.advance(Duration::from_secs(15));

        assert!(available_nodes(&ledger, QUERY_TTL).is_empty());
        // Still physically present until a scrub runs.
        assert!(ledger.last_block().entry(LIVENESS_BUCKET, "peer-a").is_some());

        assert_eq!(alive.scrub().await.unwrap(), 1);
        assert!(ledger.last_block().bucket(LIVENESS_BUCKET).is_none());
    }

    #[tokio::test]
    async fn test_query_ttl_filters_old_heartbeats() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let ledger = ledger(clock.clone());
        let config = AliveConfig {
            store_ttl: Duration::from_secs(3600),
            ..scenario_config()
        };
        let alive = AliveService::new(ledger.clone(), "peer-a", config);

        alive.heartbeat().await.unwrap();
        let later = ledger.now() + duration_millis(Duration::from_secs(120));

        assert_eq!(
            available_nodes_at(&ledger, Duration::from_secs(300), later),
            vec!["peer-a"]
        );
        assert!(available_nodes_at(&ledger, Duration::from_secs(60), later).is_empty());
    }

    #[tokio::test]
    async fn test_scrub_without_expired_entries_commits_nothing() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let ledger = ledger(clock.clone());
        let alive = AliveService::new(ledger.clone(), "peer-a", scenario_config());

        alive.heartbeat().await.unwrap();
        assert_eq!(alive.scrub().await.unwrap(), 0);
        assert_eq!(ledger.index(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_liveness_lifecycle() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let ledger = ledger(clock.clone());
        let alive = Arc::new(AliveService::new(
            ledger.clone(),
            "peer-a",
            scenario_config(),
        ));

        // Appears shortly after starting.
        let (stop, rx) = watch::channel(false);
        let handle = alive.clone().spawn(rx);
        advance(&clock, 10).await;
        assert_eq!(available_nodes(&ledger, QUERY_TTL), vec!["peer-a"]);
        let index = ledger.index();
        assert!(index >= 5, "expected several heartbeats, index {index}");

        // Stops heartbeating.
        stop.send(true).unwrap();
        handle.await.unwrap();
        advance(&clock, 30).await;
        assert!(available_nodes(&ledger, QUERY_TTL).is_empty());
        // The stopped service wrote nothing after shutdown.
        assert_eq!(ledger.index(), index);

        // Resumes.
        let (_stop, rx) = watch::channel(false);
        let _handle = alive.clone().spawn(rx);
        advance(&clock, 10).await;
        assert_eq!(available_nodes(&ledger, QUERY_TTL), vec!["peer-a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_running_service_scrubs_departed_peers() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let ledger = ledger(clock.clone());

        // A peer that heartbeated once and left.
        let departed = AliveService::new(ledger.clone(), "peer-b", scenario_config());
        departed.heartbeat().await.unwrap();

        let alive = Arc::new(AliveService::new(
            ledger.clone(),
            "peer-a",
            scenario_config(),
        ));
        let (stop, rx) = watch::channel(false);
        let handle = alive.spawn(rx);

        advance(&clock, 30).await;
        assert_eq!(available_nodes(&ledger, QUERY_TTL), vec!["peer-a"]);
        assert!(ledger.last_block().entry(LIVENESS_BUCKET, "peer-b").is_none());

        stop.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_write_budget_succeeds_when_idle() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let ledger = ledger(clock);
        let config = AliveConfig {
            write_timeout: Duration::ZERO,
            ..scenario_config()
        };
        let alive = AliveService::new(ledger.clone(), "peer-a", config);

        // A zero budget still succeeds when the commit lock is free.
        alive.heartbeat().await.unwrap();
        assert_eq!(ledger.index(), 1);
    }
}
