use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use futures::StreamExt;
use libp2p::gossipsub::{self, IdentTopic};
use libp2p::kad::{self, QueryId, QueryResult};
use libp2p::multiaddr::Protocol;
use libp2p::swarm::dial_opts::DialOpts;
use libp2p::swarm::SwarmEvent;
use libp2p::{Multiaddr, PeerId, Swarm, SwarmBuilder};
use skein_ledger::error::LedgerError;
use skein_ledger::gossip::Gossip;
use skein_types::network::LedgerMessage;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::behaviour::{build_behaviour, SkeinBehaviour, SkeinBehaviourEvent};
use crate::codec;
use crate::config::NetworkConfig;
use crate::error::{DiscoveryError, NetError};
use crate::host::{AddrInfo, Connectedness, Host, Routing, RoutingProvider};
use crate::peer_manager::PeerManager;
use crate::protocol::ledger_topic;

type Reply<T> = oneshot::Sender<Result<T, NetError>>;

/// Requests from handles to the swarm task.
enum Command {
    Dial {
        info: AddrInfo,
        reply: Reply<()>,
    },
    EnableRouting {
        bootstrap: Vec<AddrInfo>,
        reply: Reply<()>,
    },
    Bootstrap {
        reply: Reply<()>,
    },
    StartProviding {
        key: String,
        reply: Reply<()>,
    },
    GetProviders {
        key: String,
        reply: Reply<Vec<AddrInfo>>,
    },
    GetClosestPeers {
        reply: Reply<Vec<PeerId>>,
    },
    Publish {
        data: Vec<u8>,
        reply: Reply<()>,
    },
}

/// Kademlia queries waiting for their final result.
enum PendingQuery {
    Bootstrap(Reply<()>),
    Provide(Reply<()>),
    Providers {
        reply: Reply<Vec<AddrInfo>>,
        found: HashSet<PeerId>,
    },
    Closest(Reply<Vec<PeerId>>),
}

/// Owns the libp2p swarm. Everything else talks to it through a
/// [`NetworkHandle`].
pub struct NetworkNode {
    swarm: Swarm<SkeinBehaviour>,
    commands: mpsc::Receiver<Command>,
    peers: Arc<RwLock<PeerManager>>,
    inbound: broadcast::Sender<LedgerMessage>,
    topic: IdentTopic,
    routing_enabled: bool,
    pending_dials: HashMap<PeerId, Vec<Reply<()>>>,
    pending_queries: HashMap<QueryId, PendingQuery>,
    max_connections: usize,
}

impl NetworkNode {
    /// Create the swarm, start listening and subscribe to the ledger topic.
    pub fn new(config: &NetworkConfig) -> Result<(Self, NetworkHandle), NetError> {
        let keypair = if let Some(seed) = &config.keypair_seed {
            let mut seed_bytes = *seed;
            libp2p::identity::Keypair::ed25519_from_bytes(&mut seed_bytes).map_err(|e| {
                NetError::NetworkError {
                    reason: format!("invalid keypair seed: {}", e),
                }
            })?
        } else {
            libp2p::identity::Keypair::generate_ed25519()
        };

        let query_timeout = config.query_timeout;
        let idle_timeout = config.idle_timeout;
        let mut swarm = SwarmBuilder::with_existing_identity(keypair)
            .with_tokio()
            .with_tcp(
                libp2p::tcp::Config::default(),
                libp2p::noise::Config::new,
                libp2p::yamux::Config::default,
            )
            .map_err(|e| NetError::NetworkError {
                reason: format!("tcp transport: {}", e),
            })?
            .with_dns()
            .map_err(|e| NetError::NetworkError {
                reason: format!("dns transport: {}", e),
            })?
            .with_behaviour(|key| build_behaviour(key, query_timeout))
            .map_err(|e| NetError::NetworkError {
                reason: format!("behaviour: {}", e),
            })?
            .with_swarm_config(|cfg| cfg.with_idle_connection_timeout(idle_timeout))
            .build();

        let topic = IdentTopic::new(ledger_topic(&config.network_id));
        swarm
            .behaviour_mut()
            .gossipsub
            .subscribe(&topic)
            .map_err(|e| NetError::ProtocolError {
                reason: format!("subscribe to {}: {}", topic, e),
            })?;

        let listen_addr =
            Multiaddr::from(config.listen_addr.ip()).with(Protocol::Tcp(config.listen_addr.port()));
        swarm
            .listen_on(listen_addr)
            .map_err(|e| NetError::NetworkError {
                reason: format!("listen: {}", e),
            })?;

        let local_peer_id = *swarm.local_peer_id();
        let peers = Arc::new(RwLock::new(PeerManager::new(config.max_connections)));
        let (command_tx, command_rx) = mpsc::channel(256);
        let (inbound, _) = broadcast::channel(1024);

        info!(
            peer_id = %local_peer_id,
            listen = %config.listen_addr,
            network = %config.network_id,
            "network node created"
        );

        let handle = NetworkHandle {
            local_peer_id,
            commands: command_tx,
            peers: peers.clone(),
            inbound: inbound.clone(),
        };

        let node = Self {
            swarm,
            commands: command_rx,
            peers,
            inbound,
            topic,
            routing_enabled: false,
            pending_dials: HashMap::new(),
            pending_queries: HashMap::new(),
            max_connections: config.max_connections,
        };

        Ok((node, handle))
    }

    /// Get the local peer ID.
    pub fn local_peer_id(&self) -> PeerId {
        *self.swarm.local_peer_id()
    }

    /// Main event loop. Runs until shutdown or until every handle is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }

                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!("all network handles dropped");
                        break;
                    }
                },

                event = self.swarm.select_next_some() => self.handle_swarm_event(event),
            }
        }
        info!("network node stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Dial { info, reply } => self.dial(info, reply),
            Command::EnableRouting { bootstrap, reply } => {
                self.routing_enabled = true;
                let kademlia = &mut self.swarm.behaviour_mut().kademlia;
                for info in bootstrap {
                    for addr in info.addrs {
                        kademlia.add_address(&info.peer_id, addr);
                    }
                }
                info!("dht routing enabled");
                let _ = reply.send(Ok(()));
            }
            Command::Bootstrap { reply } => {
                match self.swarm.behaviour_mut().kademlia.bootstrap() {
                    Ok(id) => {
                        self.pending_queries.insert(id, PendingQuery::Bootstrap(reply));
                    }
                    Err(_) => {
                        let _ = reply.send(Err(NetError::NoKnownPeers));
                    }
                }
            }
            Command::StartProviding { key, reply } => {
                let key = kad::RecordKey::new(&key);
                match self.swarm.behaviour_mut().kademlia.start_providing(key) {
                    Ok(id) => {
                        self.pending_queries.insert(id, PendingQuery::Provide(reply));
                    }
                    Err(e) => {
                        let _ = reply.send(Err(NetError::ProtocolError {
                            reason: format!("start providing: {}", e),
                        }));
                    }
                }
            }
            Command::GetProviders { key, reply } => {
                let id = self
                    .swarm
                    .behaviour_mut()
                    .kademlia
                    .get_providers(kad::RecordKey::new(&key));
                self.pending_queries.insert(
                    id,
                    PendingQuery::Providers {
                        reply,
                        found: HashSet::new(),
                    },
                );
            }
            Command::GetClosestPeers { reply } => {
                let local = *self.swarm.local_peer_id();
                let id = self.swarm.behaviour_mut().kademlia.get_closest_peers(local);
                self.pending_queries.insert(id, PendingQuery::Closest(reply));
            }
            Command::Publish { data, reply } => {
                let result = self
                    .swarm
                    .behaviour_mut()
                    .gossipsub
                    .publish(self.topic.clone(), data)
                    .map(|_| ())
                    .map_err(|e| NetError::NetworkError {
                        reason: format!("publish: {}", e),
                    });
                let _ = reply.send(result);
            }
        }
    }

    fn dial(&mut self, info: AddrInfo, reply: Reply<()>) {
        if self.swarm.is_connected(&info.peer_id) {
            let _ = reply.send(Ok(()));
            return;
        }

        self.peers_mut()
            .add_addresses(&info.peer_id, info.addrs.iter().cloned());

        let peer_id = info.peer_id;
        let opts = DialOpts::peer_id(peer_id)
            .addresses(info.addrs)
            .extend_addresses_through_behaviour()
            .build();
        match self.swarm.dial(opts) {
            Ok(()) => self.pending_dials.entry(peer_id).or_default().push(reply),
            Err(e) => {
                let _ = reply.send(Err(NetError::DialFailed {
                    peer: peer_id.to_string(),
                    reason: e.to_string(),
                }));
            }
        }
    }

    fn handle_swarm_event(&mut self, event: SwarmEvent<SkeinBehaviourEvent>) {
        match event {
            SwarmEvent::Behaviour(event) => self.handle_behaviour_event(event),
            SwarmEvent::ConnectionEstablished {
                peer_id, endpoint, ..
            } => {
                debug!(%peer_id, ?endpoint, "connection established");
                if endpoint.is_dialer() {
                    let addr = endpoint.get_remote_address().clone();
                    self.peers_mut().add_addresses(&peer_id, [addr]);
                }
                if !self.peers_mut().add_peer(peer_id) {
                    warn!(
                        %peer_id,
                        max = self.max_connections,
                        "peer limit reached, disconnecting peer"
                    );
                    let _ = self.swarm.disconnect_peer_id(peer_id);
                    self.resolve_dials(
                        &peer_id,
                        Err(NetError::DialFailed {
                            peer: peer_id.to_string(),
                            reason: "peer limit reached".to_string(),
                        }),
                    );
                    return;
                }
                self.resolve_dials(&peer_id, Ok(()));
            }
            SwarmEvent::ConnectionClosed {
                peer_id,
                cause,
                num_established,
                ..
            } => {
                debug!(%peer_id, ?cause, "connection closed");
                if num_established == 0 {
                    self.peers_mut().remove_peer(&peer_id);
                }
            }
            SwarmEvent::OutgoingConnectionError {
                peer_id: Some(peer_id),
                error,
                ..
            } => {
                debug!(%peer_id, "outgoing connection failed: {}", error);
                if !self.swarm.is_connected(&peer_id) {
                    self.resolve_dials(
                        &peer_id,
                        Err(NetError::DialFailed {
                            peer: peer_id.to_string(),
                            reason: error.to_string(),
                        }),
                    );
                }
            }
            SwarmEvent::NewListenAddr { address, .. } => {
                info!(%address, "listening on new address");
                self.peers_mut().add_listen_addr(address);
            }
            SwarmEvent::ExpiredListenAddr { address, .. } => {
                self.peers_mut().remove_listen_addr(&address);
            }
            SwarmEvent::NewExternalAddrOfPeer { peer_id, address } => {
                self.peers_mut().add_addresses(&peer_id, [address]);
            }
            other => {
                debug!(?other, "other swarm event");
            }
        }
    }

    fn handle_behaviour_event(&mut self, event: SkeinBehaviourEvent) {
        match event {
            SkeinBehaviourEvent::Gossipsub(gossipsub::Event::Message {
                propagation_source,
                message,
                ..
            }) => match codec::decode_message(&message.data) {
                Ok(msg) => {
                    debug!(
                        %propagation_source,
                        index = msg.block().index,
                        "received ledger message"
                    );
                    let _ = self.inbound.send(msg);
                }
                Err(e) => {
                    warn!(%propagation_source, "failed to decode gossipsub message: {}", e);
                }
            },
            SkeinBehaviourEvent::Kademlia(kad::Event::OutboundQueryProgressed {
                id,
                result,
                step,
                ..
            }) => self.handle_query_progress(id, result, step.last),
            SkeinBehaviourEvent::Kademlia(kad::Event::RoutingUpdated {
                peer, addresses, ..
            }) => {
                self.peers_mut()
                    .add_addresses(&peer, addresses.iter().cloned());
            }
            SkeinBehaviourEvent::Identify(libp2p::identify::Event::Received {
                peer_id,
                info,
                ..
            }) => {
                debug!(
                    %peer_id,
                    protocol = %info.protocol_version,
                    agent = %info.agent_version,
                    "identified peer"
                );
                {
                    let mut peers = self.peers_mut();
                    peers.add_addresses(&peer_id, info.listen_addrs.iter().cloned());
                    peers.set_agent_version(&peer_id, info.agent_version.clone());
                }
                let speaks_kad = info.protocols.iter().any(|p| *p == kad::PROTOCOL_NAME);
                if self.routing_enabled && speaks_kad {
                    let kademlia = &mut self.swarm.behaviour_mut().kademlia;
                    for addr in info.listen_addrs {
                        kademlia.add_address(&peer_id, addr);
                    }
                }
            }
            _ => {}
        }
    }

    fn handle_query_progress(&mut self, id: QueryId, result: QueryResult, last: bool) {
        let Some(pending) = self.pending_queries.remove(&id) else {
            return;
        };

        match (pending, result) {
            (PendingQuery::Bootstrap(reply), QueryResult::Bootstrap(result)) => {
                // The first response means the refresh is under way.
                let _ = reply.send(result.map(|_| ()).map_err(query_error));
            }
            (PendingQuery::Provide(reply), QueryResult::StartProviding(result)) => {
                let _ = reply.send(result.map(|_| ()).map_err(query_error));
            }
            (PendingQuery::Providers { reply, mut found }, QueryResult::GetProviders(result)) => {
                match result {
                    Ok(kad::GetProvidersOk::FoundProviders { providers, .. }) => {
                        found.extend(providers);
                    }
                    Ok(kad::GetProvidersOk::FinishedWithNoAdditionalRecord { .. }) => {}
                    Err(e) if found.is_empty() => {
                        let _ = reply.send(Err(query_error(e)));
                        return;
                    }
                    Err(e) => {
                        debug!(found = found.len(), "provider query ended early: {}", e);
                        self.reply_providers(reply, found);
                        return;
                    }
                }
                if last {
                    self.reply_providers(reply, found);
                } else {
                    self.pending_queries
                        .insert(id, PendingQuery::Providers { reply, found });
                }
            }
            (PendingQuery::Closest(reply), QueryResult::GetClosestPeers(result)) => match result {
                Ok(ok) => {
                    let mut peers = self.peers_mut();
                    let ids: Vec<PeerId> = ok
                        .peers
                        .into_iter()
                        .map(|info| {
                            peers.add_addresses(&info.peer_id, info.addrs);
                            info.peer_id
                        })
                        .collect();
                    drop(peers);
                    let _ = reply.send(Ok(ids));
                }
                Err(e) => {
                    let _ = reply.send(Err(query_error(e)));
                }
            },
            (_, other) => {
                debug!(?id, ?other, "query result did not match its request");
            }
        }
    }

    fn reply_providers(&self, reply: Reply<Vec<AddrInfo>>, found: HashSet<PeerId>) {
        let peers = self.peers();
        let infos = found
            .into_iter()
            .map(|peer_id| AddrInfo::new(peer_id, peers.addresses(&peer_id)))
            .collect();
        let _ = reply.send(Ok(infos));
    }

    fn resolve_dials(&mut self, peer_id: &PeerId, result: Result<(), NetError>) {
        let Some(waiters) = self.pending_dials.remove(peer_id) else {
            return;
        };
        for waiter in waiters {
            let outcome = match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(NetError::DialFailed {
                    peer: peer_id.to_string(),
                    reason: e.to_string(),
                }),
            };
            let _ = waiter.send(outcome);
        }
    }

    fn peers(&self) -> RwLockReadGuard<'_, PeerManager> {
        self.peers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn peers_mut(&self) -> RwLockWriteGuard<'_, PeerManager> {
        self.peers.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn query_error(e: impl fmt::Display) -> NetError {
    NetError::NetworkError {
        reason: format!("dht query: {}", e),
    }
}

/// Cloneable front end of a running [`NetworkNode`].
///
/// Implements the host, routing and gossip capabilities consumed by
/// discovery and the ledger.
#[derive(Clone)]
pub struct NetworkHandle {
    local_peer_id: PeerId,
    commands: mpsc::Sender<Command>,
    peers: Arc<RwLock<PeerManager>>,
    inbound: broadcast::Sender<LedgerMessage>,
}

impl NetworkHandle {
    pub fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    pub fn connected_peers(&self) -> Vec<PeerId> {
        self.peers().connected_peers().copied().collect()
    }

    pub fn peer_count(&self) -> usize {
        self.peers().peer_count()
    }

    /// Addresses the swarm is listening on.
    pub fn listen_addrs(&self) -> Vec<Multiaddr> {
        self.peers().listen_addrs().to_vec()
    }

    /// Encode and broadcast a ledger message on the network's topic.
    pub async fn publish_message(&self, msg: &LedgerMessage) -> Result<(), NetError> {
        let data = codec::encode_message(msg)?;
        self.request(|reply| Command::Publish { data, reply }).await
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T, NetError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| NetError::ChannelError {
                reason: "network task stopped".to_string(),
            })?;
        rx.await.map_err(|_| NetError::ChannelError {
            reason: "network task dropped the reply".to_string(),
        })?
    }

    fn peers(&self) -> RwLockReadGuard<'_, PeerManager> {
        self.peers.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Host for NetworkHandle {
    fn identity(&self) -> PeerId {
        self.local_peer_id
    }

    fn connectedness(&self, peer: &PeerId) -> Connectedness {
        if self.peers().is_connected(peer) {
            Connectedness::Connected
        } else {
            Connectedness::NotConnected
        }
    }

    fn known_addresses(&self, peer: &PeerId) -> Vec<Multiaddr> {
        self.peers().addresses(peer)
    }

    async fn connect(&self, info: AddrInfo) -> Result<(), NetError> {
        self.request(|reply| Command::Dial { info, reply }).await
    }
}

#[async_trait]
impl Routing for NetworkHandle {
    async fn bootstrap(&self) -> Result<(), NetError> {
        self.request(|reply| Command::Bootstrap { reply }).await
    }

    async fn advertise(&self, key: &str) -> Result<(), NetError> {
        let key = key.to_string();
        self.request(|reply| Command::StartProviding { key, reply })
            .await
    }

    async fn find_peers(&self, key: &str) -> Result<Vec<AddrInfo>, NetError> {
        let key = key.to_string();
        self.request(|reply| Command::GetProviders { key, reply })
            .await
    }

    async fn closest_peers(&self) -> Result<Vec<PeerId>, NetError> {
        self.request(|reply| Command::GetClosestPeers { reply }).await
    }
}

#[async_trait]
impl RoutingProvider for NetworkHandle {
    async fn start_routing(
        &self,
        bootstrap: &[AddrInfo],
    ) -> Result<Arc<dyn Routing>, DiscoveryError> {
        let bootstrap = bootstrap.to_vec();
        self.request(|reply| Command::EnableRouting { bootstrap, reply })
            .await
            .map_err(|e| DiscoveryError::DhtInit {
                reason: e.to_string(),
            })?;
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl Gossip for NetworkHandle {
    async fn publish(&self, message: LedgerMessage) -> Result<(), LedgerError> {
        self.publish_message(&message)
            .await
            .map_err(|e| LedgerError::GossipError {
                reason: e.to_string(),
            })
    }

    fn subscribe(&self) -> broadcast::Receiver<LedgerMessage> {
        self.inbound.subscribe()
    }
}
