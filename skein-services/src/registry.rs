use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use skein_ledger::Ledger;
use skein_types::constants::{
    DEFAULT_SERVICE_ANNOUNCE_INTERVAL, DEFAULT_STORE_TTL, DEFAULT_WRITE_TIMEOUT, SERVICES_BUCKET,
};

use crate::error::ServiceError;

/// A service published into the ledger, keyed by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub name: String,
    /// Peer hosting the service.
    pub peer_id: String,
    /// Where the hosting peer forwards service traffic.
    pub address: String,
}

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub announce_interval: Duration,
    pub write_timeout: Duration,
    /// Lifetime of an announcement. Services whose host stops announcing
    /// drop out after this.
    pub ttl: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            announce_interval: DEFAULT_SERVICE_ANNOUNCE_INTERVAL,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            ttl: DEFAULT_STORE_TTL,
        }
    }
}

/// Services this peer publishes, re-announced on a timer.
pub struct ServiceRegistry {
    ledger: Arc<Ledger>,
    peer_id: String,
    config: RegistryConfig,
    services: Vec<ServiceRecord>,
}

impl ServiceRegistry {
    pub fn new(ledger: Arc<Ledger>, peer_id: impl Into<String>, config: RegistryConfig) -> Self {
        Self {
            ledger,
            peer_id: peer_id.into(),
            config,
            services: Vec::new(),
        }
    }

    /// Add a service to publish. A name registered twice keeps the last
    /// address.
    pub fn register(&mut self, name: &str, address: &str) -> Result<(), ServiceError> {
        if name.trim().is_empty() {
            return Err(ServiceError::InvalidName {
                reason: "empty service name".to_string(),
            });
        }
        let record = ServiceRecord {
            name: name.to_string(),
            peer_id: self.peer_id.clone(),
            address: address.to_string(),
        };
        match self.services.iter_mut().find(|s| s.name == name) {
            Some(existing) => *existing = record,
            None => self.services.push(record),
        }
        Ok(())
    }

    pub fn services(&self) -> &[ServiceRecord] {
        &self.services
    }

    /// Write every registered service once. Stops at the first failure.
    pub async fn announce(&self) -> Result<usize, ServiceError> {
        for record in &self.services {
            let value = serde_json::to_string(record).map_err(|e| {
                ServiceError::MalformedRecord {
                    name: record.name.clone(),
                    reason: e.to_string(),
                }
            })?;
            self.ledger
                .persist(
                    self.config.write_timeout,
                    self.config.ttl,
                    SERVICES_BUCKET,
                    &record.name,
                    &value,
                )
                .await?;
        }
        Ok(self.services.len())
    }

    /// Spawn the announcement loop. Does nothing useful with no services
    /// registered, so callers register first.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.announce_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(services = self.services.len(), "service registry started");

            loop {
                tokio::select! {
                    biased;

                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }

                    _ = ticker.tick() => {
                        if *shutdown.borrow() {
                            break;
                        }
                        match self.announce().await {
                            Ok(n) => debug!(services = n, "announced services"),
                            Err(e) => warn!("service announcement failed: {e}"),
                        }
                    }
                }
            }

            info!("service registry stopped");
        })
    }
}

/// Every live service in the ledger. Records that fail to decode are
/// skipped.
pub fn available_services(ledger: &Ledger) -> Vec<ServiceRecord> {
    ledger
        .current_data(SERVICES_BUCKET)
        .into_iter()
        .filter_map(|(name, value)| match decode(&name, &value) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("{e}");
                None
            }
        })
        .collect()
}

/// The live record for `name`, if one is published.
pub fn lookup_service(ledger: &Ledger, name: &str) -> Result<Option<ServiceRecord>, ServiceError> {
    ledger
        .get_key(SERVICES_BUCKET, name)
        .map(|value| decode(name, &value))
        .transpose()
}

fn decode(name: &str, value: &str) -> Result<ServiceRecord, ServiceError> {
    serde_json::from_str(value).map_err(|e| ServiceError::MalformedRecord {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_ledger::clock::ManualClock;
    use skein_storage::memory::MemoryStore;

    fn ledger(clock: Arc<ManualClock>) -> Arc<Ledger> {
        Arc::new(
            Ledger::new("peer-a", Arc::new(MemoryStore::new()))
                .unwrap()
                .with_clock(clock),
        )
    }

    fn config() -> RegistryConfig {
        RegistryConfig {
            announce_interval: Duration::from_secs(5),
            write_timeout: Duration::from_secs(1),
            ttl: Duration::from_secs(20),
        }
    }

    #[tokio::test]
    async fn test_announce_and_list() {
        let clock = Arc::new(ManualClock::new(1_000));
        let ledger = ledger(clock);
        let mut registry = ServiceRegistry::new(ledger.clone(), "peer-a", config());
        registry.register("web", "127.0.0.1:8080").unwrap();
        registry.register("ssh", "127.0.0.1:22").unwrap();

        assert_eq!(registry.announce().await.unwrap(), 2);

        let services = available_services(&ledger);
        assert_eq!(services.len(), 2);
        let web = lookup_service(&ledger, "web").unwrap().unwrap();
        assert_eq!(web.peer_id, "peer-a");
        assert_eq!(web.address, "127.0.0.1:8080");
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let clock = Arc::new(ManualClock::new(1_000));
        let mut registry = ServiceRegistry::new(ledger(clock), "peer-a", config());
        assert!(matches!(
            registry.register("  ", "127.0.0.1:1"),
            Err(ServiceError::InvalidName { .. })
        ));
    }

    #[test]
    fn test_reregistering_replaces_address() {
        let clock = Arc::new(ManualClock::new(1_000));
        let mut registry = ServiceRegistry::new(ledger(clock), "peer-a", config());
        registry.register("web", "127.0.0.1:1").unwrap();
        registry.register("web", "127.0.0.1:2").unwrap();
        assert_eq!(registry.services().len(), 1);
        assert_eq!(registry.services()[0].address, "127.0.0.1:2");
    }

    #[tokio::test]
    async fn test_services_expire_without_reannouncement() {
        let clock = Arc::new(ManualClock::new(1_000));
        let ledger = ledger(clock.clone());
        let mut registry = ServiceRegistry::new(ledger.clone(), "peer-a", config());
        registry.register("web", "127.0.0.1:8080").unwrap();
        registry.announce().await.unwrap();

        clock.advance(Duration::from_secs(21));
        assert!(available_services(&ledger).is_empty());
        assert!(lookup_service(&ledger, "web").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_records_are_skipped() {
        let clock = Arc::new(ManualClock::new(1_000));
        let ledger = ledger(clock);
        ledger
            .persist(
                Duration::from_secs(1),
                Duration::from_secs(60),
                SERVICES_BUCKET,
                "broken",
                "not json",
            )
            .await
            .unwrap();

        assert!(available_services(&ledger).is_empty());
        assert!(matches!(
            lookup_service(&ledger, "broken"),
            Err(ServiceError::MalformedRecord { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_reannounces_until_shutdown() {
        let clock = Arc::new(ManualClock::new(1_000));
        let ledger = ledger(clock);
        let mut registry = ServiceRegistry::new(ledger.clone(), "peer-a", config());
        registry.register("web", "127.0.0.1:8080").unwrap();

        let (stop, rx) = watch::channel(false);
        let handle = Arc::new(registry).spawn(rx);
        tokio::time::sleep(Duration::from_secs(11)).await;
        // Ticks at 0s, 5s and 10s.
        assert_eq!(ledger.index(), 3);

        stop.send(true).unwrap();
        handle.await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(ledger.index(), 3);
    }
}
