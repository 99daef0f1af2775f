use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use skein_ledger::gossip::Gossip;
use skein_ledger::sync::spawn_sync;
use skein_ledger::Ledger;
use skein_net::close_peers::ClosePeerFinder;
use skein_net::dht::Dht;
use skein_net::host::{AddrInfo, Host, RoutingProvider};
use skein_net::{NetworkHandle, NetworkNode};
use skein_services::{available_nodes, AliveService, ServiceRegistry};
use skein_storage::memory::MemoryStore;

use crate::config::NodeConfig;
use crate::error::NodeError;

/// How long shutdown waits for background tasks to wind down.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// The main node that ties together all subsystems.
pub struct Node {
    config: NodeConfig,
    network: Option<NetworkNode>,
    handle: NetworkHandle,
    ledger: Arc<Ledger>,
    dht: Arc<Dht>,
    close_peers: ClosePeerFinder,
    alive: Arc<AliveService>,
    registry: Arc<ServiceRegistry>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Node {
    /// Create a new node from the given configuration. Nothing runs until
    /// [`Node::start`].
    pub async fn new(config: NodeConfig) -> Result<Self, NodeError> {
        let (network, handle) = NetworkNode::new(&config.network_config()?)?;
        let peer_id = handle.local_peer_id().to_string();

        let gossip: Arc<dyn Gossip> = Arc::new(handle.clone());
        let ledger = Arc::new(
            Ledger::new(
                peer_id.clone(),
                Arc::new(MemoryStore::with_retention(config.ledger.retained_blocks)),
            )?
            .with_gossip(gossip),
        );

        let host: Arc<dyn Host> = Arc::new(handle.clone());
        let provider: Arc<dyn RoutingProvider> = Arc::new(handle.clone());
        let dht = Arc::new(Dht::new(&config.discovery_config(), host, provider)?);
        let close_peers = ClosePeerFinder::new(dht.clone(), &config.relay_config());

        let alive = Arc::new(AliveService::new(
            ledger.clone(),
            peer_id.clone(),
            config.alive_config(),
        ));

        let mut registry = ServiceRegistry::new(ledger.clone(), peer_id, config.registry_config());
        for service in &config.services.publish {
            registry.register(&service.name, &service.address)?;
        }

        let (shutdown, _) = watch::channel(false);

        tracing::info!(
            peer_id = %handle.local_peer_id(),
            network = %config.network.network_id,
            rotating = dht.rendezvous().is_rotating(),
            "node created"
        );

        Ok(Self {
            config,
            network: Some(network),
            handle,
            ledger,
            dht,
            close_peers,
            alive,
            registry: Arc::new(registry),
            shutdown,
            tasks: Vec::new(),
        })
    }

    /// Spawn every subsystem. Fails only if discovery cannot create its
    /// routing table.
    pub async fn start(&mut self) -> Result<(), NodeError> {
        let Some(network) = self.network.take() else {
            return Err(NodeError::ConfigError {
                reason: "node already started".to_string(),
            });
        };

        let shutdown = self.shutdown.subscribe();
        self.tasks.push(tokio::spawn(network.run(shutdown)));

        let gossip: Arc<dyn Gossip> = Arc::new(self.handle.clone());
        self.tasks.push(spawn_sync(
            self.ledger.clone(),
            gossip,
            self.config.ledger_config().sync_interval,
            self.shutdown.subscribe(),
        ));

        let discovery = self.dht.clone().run(self.shutdown.subscribe()).await?;
        self.tasks.push(discovery);

        if self.config.alive.enabled {
            self.tasks
                .push(self.alive.clone().spawn(self.shutdown.subscribe()));
        }
        if !self.registry.services().is_empty() {
            self.tasks
                .push(self.registry.clone().spawn(self.shutdown.subscribe()));
        }

        tracing::info!(tasks = self.tasks.len(), "node started");
        Ok(())
    }

    /// Start the node and run until Ctrl+C.
    pub async fn run(&mut self) -> Result<(), NodeError> {
        self.start().await?;
        tracing::info!("Node is running. Press Ctrl+C to stop.");

        tokio::signal::ctrl_c().await?;
        tracing::info!("Received shutdown signal");
        self.shutdown().await;
        Ok(())
    }

    /// Signal every background task to stop and wait for them.
    pub async fn shutdown(&mut self) {
        tracing::info!("Shutting down node...");
        self.shutdown.send_replace(true);

        for task in self.tasks.drain(..) {
            match tokio::time::timeout(SHUTDOWN_GRACE, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("background task failed: {}", e),
                Err(_) => tracing::warn!("background task did not stop in time"),
            }
        }

        tracing::info!("Node shutdown complete");
    }

    pub fn network(&self) -> &NetworkHandle {
        &self.handle
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn discovery(&self) -> &Arc<Dht> {
        &self.dht
    }

    /// Relay candidate source for transports that need one.
    pub fn close_peers(&self) -> &ClosePeerFinder {
        &self.close_peers
    }

    /// Stream the configured number of relay candidates.
    pub fn relay_candidates(&self) -> mpsc::Receiver<AddrInfo> {
        self.close_peers.find_default()
    }

    /// Peers currently heartbeating into the ledger.
    pub fn available_nodes(&self) -> Vec<String> {
        available_nodes(&self.ledger, self.config.query_ttl())
    }
}
