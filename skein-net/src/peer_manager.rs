use std::collections::HashMap;
use std::time::Instant;

use libp2p::{Multiaddr, PeerId};

/// Information about a connected peer.
pub struct PeerInfo {
    /// The libp2p peer ID.
    pub peer_id: PeerId,
    /// Agent string reported through identify.
    pub agent_version: Option<String>,
    /// When this peer connected.
    pub connected_at: Instant,
}

/// Tracks connected peers and every address learned for any peer.
///
/// The address book outlives connections: addresses found through identify,
/// the DHT or explicit dials stay known after the peer disconnects.
pub struct PeerManager {
    peers: HashMap<PeerId, PeerInfo>,
    address_book: HashMap<PeerId, Vec<Multiaddr>>,
    listen_addrs: Vec<Multiaddr>,
    max_connections: usize,
}

impl PeerManager {
    /// Create a new PeerManager with a maximum connection limit.
    pub fn new(max_connections: usize) -> Self {
        Self {
            peers: HashMap::new(),
            address_book: HashMap::new(),
            listen_addrs: Vec::new(),
            max_connections,
        }
    }

    /// Add a peer. Returns false if the connection limit is reached.
    pub fn add_peer(&mut self, peer_id: PeerId) -> bool {
        if self.peers.contains_key(&peer_id) {
            return true;
        }
        if self.peers.len() >= self.max_connections {
            return false;
        }
        self.peers.insert(
            peer_id,
            PeerInfo {
                peer_id,
                agent_version: None,
                connected_at: Instant::now(),
            },
        );
        true
    }

    pub fn remove_peer(&mut self, peer_id: &PeerId) {
        self.peers.remove(peer_id);
    }

    pub fn is_connected(&self, peer_id: &PeerId) -> bool {
        self.peers.contains_key(peer_id)
    }

    /// Record addresses for a peer, skipping ones already known.
    pub fn add_addresses<I>(&mut self, peer_id: &PeerId, addrs: I)
    where
        I: IntoIterator<Item = Multiaddr>,
    {
        let known = self.address_book.entry(*peer_id).or_default();
        for addr in addrs {
            if !known.contains(&addr) {
                known.push(addr);
            }
        }
    }

    /// Addresses known for a peer.
    pub fn addresses(&self, peer_id: &PeerId) -> Vec<Multiaddr> {
        self.address_book.get(peer_id).cloned().unwrap_or_default()
    }

    pub fn add_listen_addr(&mut self, addr: Multiaddr) {
        if !self.listen_addrs.contains(&addr) {
            self.listen_addrs.push(addr);
        }
    }

    pub fn remove_listen_addr(&mut self, addr: &Multiaddr) {
        self.listen_addrs.retain(|a| a != addr);
    }

    /// Addresses this peer is listening on.
    pub fn listen_addrs(&self) -> &[Multiaddr] {
        &self.listen_addrs
    }

    /// Whether the peer manager has reached its connection limit.
    pub fn is_full(&self) -> bool {
        self.peers.len() >= self.max_connections
    }

    /// Number of currently connected peers.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Iterator over the peer IDs of all connected peers.
    pub fn connected_peers(&self) -> impl Iterator<Item = &PeerId> {
        self.peers.keys()
    }

    /// Set the agent string for a peer (usually from identify).
    pub fn set_agent_version(&mut self, peer_id: &PeerId, agent: String) {
        if let Some(info) = self.peers.get_mut(peer_id) {
            info.agent_version = Some(agent);
        }
    }

    pub fn agent_version(&self, peer_id: &PeerId) -> Option<&str> {
        self.peers
            .get(peer_id)
            .and_then(|info| info.agent_version.as_deref())
    }
}
