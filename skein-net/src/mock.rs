//! In-process host and routing doubles for discovery tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use libp2p::{Multiaddr, PeerId};

use crate::error::{DiscoveryError, NetError};
use crate::host::{AddrInfo, Connectedness, Host, Routing, RoutingProvider};

pub fn test_addr(port: u16) -> Multiaddr {
    format!("/ip4/127.0.0.1/tcp/{port}").parse().unwrap()
}

#[derive(Default)]
struct HostState {
    connected: HashSet<PeerId>,
    reachable: HashSet<PeerId>,
    hanging: HashSet<PeerId>,
    addresses: HashMap<PeerId, Vec<Multiaddr>>,
    dialed: Vec<PeerId>,
}

/// A host whose dial outcomes are scripted per peer. Unknown peers fail.
pub struct MockHost {
    id: PeerId,
    state: Mutex<HostState>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::with_identity(PeerId::random())
    }

    pub fn with_identity(id: PeerId) -> Self {
        Self {
            id,
            state: Mutex::new(HostState::default()),
        }
    }

    pub fn set_reachable(&self, peer: PeerId) {
        self.state.lock().unwrap().reachable.insert(peer);
    }

    pub fn set_connected(&self, peer: PeerId) {
        self.state.lock().unwrap().connected.insert(peer);
    }

    /// Dials to `peer` never complete.
    pub fn set_hanging(&self, peer: PeerId) {
        self.state.lock().unwrap().hanging.insert(peer);
    }

    pub fn add_addresses(&self, peer: PeerId, addrs: Vec<Multiaddr>) {
        self.state
            .lock()
            .unwrap()
            .addresses
            .entry(peer)
            .or_default()
            .extend(addrs);
    }

    /// Every peer a dial was attempted to, sorted.
    pub fn dialed(&self) -> Vec<PeerId> {
        let mut dialed = self.state.lock().unwrap().dialed.clone();
        dialed.sort();
        dialed
    }
}

#[async_trait]
impl Host for MockHost {
    fn identity(&self) -> PeerId {
        self.id
    }

    fn connectedness(&self, peer: &PeerId) -> Connectedness {
        if self.state.lock().unwrap().connected.contains(peer) {
            Connectedness::Connected
        } else {
            Connectedness::NotConnected
        }
    }

    fn known_addresses(&self, peer: &PeerId) -> Vec<Multiaddr> {
        self.state
            .lock()
            .unwrap()
            .addresses
            .get(peer)
            .cloned()
            .unwrap_or_default()
    }

    async fn connect(&self, info: AddrInfo) -> Result<(), NetError> {
        let hanging = {
            let mut state = self.state.lock().unwrap();
            state.dialed.push(info.peer_id);
            if state.reachable.contains(&info.peer_id) {
                state.connected.insert(info.peer_id);
                return Ok(());
            }
            state.hanging.contains(&info.peer_id)
        };
        if hanging {
            futures::future::pending::<()>().await;
        }
        Err(NetError::DialFailed {
            peer: info.peer_id.to_string(),
            reason: "unreachable".to_string(),
        })
    }
}

/// Provider records shared by every [`MockRouting`] built on it.
#[derive(Clone, Default)]
pub struct MockDht {
    providers: Arc<Mutex<HashMap<String, Vec<AddrInfo>>>>,
}

impl MockDht {
    pub fn providers(&self, key: &str) -> Vec<AddrInfo> {
        self.providers
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    pub fn provide(&self, key: &str, info: AddrInfo) {
        let mut providers = self.providers.lock().unwrap();
        let entry = providers.entry(key.to_string()).or_default();
        if !entry.iter().any(|i| i.peer_id == info.peer_id) {
            entry.push(info);
        }
    }
}

/// One peer's view of a [`MockDht`].
pub struct MockRouting {
    me: AddrInfo,
    dht: MockDht,
    closest: Mutex<Option<Vec<PeerId>>>,
    fail_bootstrap: bool,
    pub bootstraps: AtomicUsize,
    pub advertised: Mutex<Vec<String>>,
}

impl MockRouting {
    pub fn new(me: AddrInfo, dht: MockDht) -> Self {
        Self {
            me,
            dht,
            closest: Mutex::new(Some(Vec::new())),
            fail_bootstrap: false,
            bootstraps: AtomicUsize::new(0),
            advertised: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_bootstrap(mut self) -> Self {
        self.fail_bootstrap = true;
        self
    }

    /// `None` makes the closest-peer query fail.
    pub fn set_closest(&self, peers: Option<Vec<PeerId>>) {
        *self.closest.lock().unwrap() = peers;
    }

    pub fn advertised(&self) -> Vec<String> {
        self.advertised.lock().unwrap().clone()
    }
}

#[async_trait]
impl Routing for MockRouting {
    async fn bootstrap(&self) -> Result<(), NetError> {
        self.bootstraps.fetch_add(1, Ordering::SeqCst);
        if self.fail_bootstrap {
            return Err(NetError::NoKnownPeers);
        }
        Ok(())
    }

    async fn advertise(&self, key: &str) -> Result<(), NetError> {
        self.advertised.lock().unwrap().push(key.to_string());
        self.dht.provide(key, self.me.clone());
        Ok(())
    }

    async fn find_peers(&self, key: &str) -> Result<Vec<AddrInfo>, NetError> {
        Ok(self.dht.providers(key))
    }

    async fn closest_peers(&self) -> Result<Vec<PeerId>, NetError> {
        self.closest
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| NetError::NetworkError {
                reason: "dht query: timeout".to_string(),
            })
    }
}

/// Hands out one shared [`MockRouting`] and counts how often it was asked.
pub struct MockProvider {
    routing: Arc<MockRouting>,
    fail: bool,
    pub starts: AtomicUsize,
}

impl MockProvider {
    pub fn new(routing: Arc<MockRouting>) -> Self {
        Self {
            routing,
            fail: false,
            starts: AtomicUsize::new(0),
        }
    }

    pub fn failing(routing: Arc<MockRouting>) -> Self {
        Self {
            fail: true,
            ..Self::new(routing)
        }
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RoutingProvider for MockProvider {
    async fn start_routing(
        &self,
        _bootstrap: &[AddrInfo],
    ) -> Result<Arc<dyn Routing>, DiscoveryError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(DiscoveryError::DhtInit {
                reason: "no transport".to_string(),
            });
        }
        Ok(self.routing.clone())
    }
}
