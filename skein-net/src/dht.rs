use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::backoff::{BackoffConfig, BackoffTicker};
use crate::bootstrap::{connect_bootstrap_peers, BootstrapList};
use crate::config::DiscoveryConfig;
use crate::error::DiscoveryError;
use crate::host::{Connectedness, Host, Routing, RoutingProvider};
use crate::rendezvous::Rendezvous;

/// Rendezvous discovery over the DHT.
///
/// The routing table is created lazily, once, by the first call to
/// [`Dht::start`] or [`Dht::run`]; later calls reuse it. Once running, a
/// connect cycle (bootstrap peers, previous key, current key) repeats on a
/// backoff timer until shutdown.
pub struct Dht {
    host: Arc<dyn Host>,
    provider: Arc<dyn RoutingProvider>,
    rendezvous: Rendezvous,
    bootstrap: BootstrapList,
    backoff: BackoffConfig,
    connect_timeout: Duration,
    query_timeout: Duration,
    routing: Mutex<Option<Arc<dyn Routing>>>,
}

impl Dht {
    pub fn new(
        config: &DiscoveryConfig,
        host: Arc<dyn Host>,
        provider: Arc<dyn RoutingProvider>,
    ) -> Result<Self, DiscoveryError> {
        Ok(Self {
            host,
            provider,
            rendezvous: Rendezvous::from_config(config)?,
            bootstrap: BootstrapList::new(&config.bootstrap_peers),
            backoff: BackoffConfig::new(config.interval, config.max_interval),
            connect_timeout: config.connect_timeout,
            query_timeout: config.query_timeout,
            routing: Mutex::new(None),
        })
    }

    pub fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }

    pub fn rendezvous(&self) -> &Rendezvous {
        &self.rendezvous
    }

    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    /// The routing table, if discovery has started.
    pub async fn routing(&self) -> Option<Arc<dyn Routing>> {
        self.routing.lock().await.clone()
    }

    /// Create the routing table, or return the existing one.
    pub async fn start(&self) -> Result<Arc<dyn Routing>, DiscoveryError> {
        let mut slot = self.routing.lock().await;
        if let Some(routing) = slot.as_ref() {
            return Ok(routing.clone());
        }
        let routing = self.provider.start_routing(self.bootstrap.peers()).await?;
        *slot = Some(routing.clone());
        Ok(routing)
    }

    /// Start discovery and spawn the connect-cycle loop.
    ///
    /// Only a failure to create the routing table is returned; everything
    /// after that is logged and retried on the next cycle.
    pub async fn run(
        self: Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<JoinHandle<()>, DiscoveryError> {
        let routing = self.start().await?;

        info!("bootstrapping dht");
        match timeout(self.query_timeout, routing.bootstrap()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("dht bootstrap failed, relying on bootstrap peers: {}", e),
            Err(_) => warn!("dht bootstrap timed out"),
        }

        Ok(tokio::spawn(async move {
            let mut ticker = BackoffTicker::new(self.backoff.clone());
            loop {
                tokio::select! {
                    biased;
                    _ = wait_for_shutdown(&mut shutdown) => break,
                    _ = self.connect_cycle(routing.as_ref()) => {}
                }
                tokio::select! {
                    biased;
                    _ = wait_for_shutdown(&mut shutdown) => break,
                    _ = ticker.tick() => {}
                }
            }
            info!("discovery stopped");
        }))
    }

    /// One discovery round. Returns how many new connections it opened.
    pub async fn connect_cycle(&self, routing: &dyn Routing) -> usize {
        let mut connected = connect_bootstrap_peers(
            self.host.as_ref(),
            self.bootstrap.peers(),
            self.connect_timeout,
        )
        .await;

        // Serve the previous key too, so peers on either side of a rotation
        // still meet during this round.
        let previous = self.rendezvous.previous();
        let current = self.rendezvous.rendezvous();
        if let Some(previous) = previous.filter(|p| *p != current) {
            connected += self.announce_and_connect(routing, &previous).await;
        }
        connected += self.announce_and_connect(routing, &current).await;

        debug!(connected, "connect cycle finished");
        connected
    }

    async fn announce_and_connect(&self, routing: &dyn Routing, key: &str) -> usize {
        match timeout(self.query_timeout, routing.advertise(key)).await {
            Ok(Ok(())) => debug!(key, "announced"),
            Ok(Err(e)) => debug!(key, "announce failed: {}", e),
            Err(_) => debug!(key, "announce timed out"),
        }

        let found = match timeout(self.query_timeout, routing.find_peers(key)).await {
            Ok(Ok(found)) => found,
            Ok(Err(e)) => {
                warn!(key, "peer search failed: {}", e);
                return 0;
            }
            Err(_) => {
                warn!(key, "peer search timed out");
                return 0;
            }
        };

        let me = self.host.identity();
        let mut connected = 0;
        for peer in found {
            if peer.peer_id == me || peer.addrs.is_empty() {
                continue;
            }
            if self.host.connectedness(&peer.peer_id) == Connectedness::Connected {
                debug!(peer = %peer.peer_id, "known peer (already connected)");
                continue;
            }
            let peer_id = peer.peer_id;
            match timeout(self.connect_timeout, self.host.connect(peer)).await {
                Ok(Ok(())) => {
                    info!(peer = %peer_id, "connected to discovered peer");
                    connected += 1;
                }
                Ok(Err(e)) => debug!(peer = %peer_id, "failed connecting: {}", e),
                Err(_) => debug!(peer = %peer_id, "connect timed out"),
            }
        }
        connected
    }
}

/// Resolves once the shutdown flag is set or its sender is gone.
pub(crate) async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
