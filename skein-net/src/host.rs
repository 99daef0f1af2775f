use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use libp2p::multiaddr::Protocol;
use libp2p::{Multiaddr, PeerId};

use crate::error::{DiscoveryError, NetError};

/// A peer identity together with the addresses it can be reached on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddrInfo {
    pub peer_id: PeerId,
    pub addrs: Vec<Multiaddr>,
}

impl AddrInfo {
    pub fn new(peer_id: PeerId, addrs: Vec<Multiaddr>) -> Self {
        Self { peer_id, addrs }
    }

    /// Split a multiaddr ending in `/p2p/<peer id>` into identity and
    /// transport address. A bare `/p2p/<peer id>` yields no addresses.
    pub fn from_p2p_addr(addr: &Multiaddr) -> Result<Self, NetError> {
        let mut transport = addr.clone();
        match transport.pop() {
            Some(Protocol::P2p(peer_id)) => {
                let addrs = if transport.is_empty() {
                    Vec::new()
                } else {
                    vec![transport]
                };
                Ok(Self { peer_id, addrs })
            }
            _ => Err(NetError::InvalidAddress {
                addr: addr.to_string(),
                reason: "missing trailing /p2p/<peer id>".to_string(),
            }),
        }
    }

    /// Parse a list of p2p multiaddrs, merging addresses that belong to the
    /// same peer. Entries that fail to parse are returned separately.
    pub fn parse_many<S: AsRef<str>>(addrs: &[S]) -> (Vec<AddrInfo>, Vec<NetError>) {
        let mut infos: Vec<AddrInfo> = Vec::new();
        let mut errors = Vec::new();
        for raw in addrs {
            match raw.as_ref().parse::<AddrInfo>() {
                Ok(info) => match infos.iter_mut().find(|i| i.peer_id == info.peer_id) {
                    Some(existing) => {
                        for addr in info.addrs {
                            if !existing.addrs.contains(&addr) {
                                existing.addrs.push(addr);
                            }
                        }
                    }
                    None => infos.push(info),
                },
                Err(e) => errors.push(e),
            }
        }
        (infos, errors)
    }
}

impl FromStr for AddrInfo {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let addr = s
            .trim()
            .parse::<Multiaddr>()
            .map_err(|e| NetError::InvalidAddress {
                addr: s.to_string(),
                reason: e.to_string(),
            })?;
        Self::from_p2p_addr(&addr)
    }
}

impl fmt::Display for AddrInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}", self.peer_id, self.addrs)
    }
}

/// Whether the host holds a live connection to a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectedness {
    Connected,
    NotConnected,
}

/// The peer host capability discovery is built on.
#[async_trait]
pub trait Host: Send + Sync {
    /// This peer's identity.
    fn identity(&self) -> PeerId;

    fn connectedness(&self, peer: &PeerId) -> Connectedness;

    /// Addresses currently known for `peer`.
    fn known_addresses(&self, peer: &PeerId) -> Vec<Multiaddr>;

    /// Open a connection to `info`. Callers bound this with a timeout.
    async fn connect(&self, info: AddrInfo) -> Result<(), NetError>;
}

/// A started DHT routing table.
#[async_trait]
pub trait Routing: Send + Sync {
    /// Refresh the routing table from known peers.
    async fn bootstrap(&self) -> Result<(), NetError>;

    /// Publish this peer as a provider of `key`.
    async fn advertise(&self, key: &str) -> Result<(), NetError>;

    /// Find peers that published themselves under `key`.
    async fn find_peers(&self, key: &str) -> Result<Vec<AddrInfo>, NetError>;

    /// Peers closest to this peer's own identity by the DHT metric.
    async fn closest_peers(&self) -> Result<Vec<PeerId>, NetError>;
}

/// Creates the routing table. Called at most once per discovery instance.
#[async_trait]
pub trait RoutingProvider: Send + Sync {
    async fn start_routing(
        &self,
        bootstrap: &[AddrInfo],
    ) -> Result<Arc<dyn Routing>, DiscoveryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEER: &str = "QmNnooDu7bfjPFoTZYxMNLWUQJyrVwtbZg5gBMjTezGAJN";

    #[test]
    fn test_parse_p2p_addr() {
        let info: AddrInfo = format!("/ip4/127.0.0.1/tcp/4001/p2p/{PEER}").parse().unwrap();
        assert_eq!(info.peer_id.to_string(), PEER);
        assert_eq!(info.addrs.len(), 1);
        assert_eq!(info.addrs[0].to_string(), "/ip4/127.0.0.1/tcp/4001");
    }

    #[test]
    fn test_parse_bare_peer_has_no_addrs() {
        let info: AddrInfo = format!("/p2p/{PEER}").parse().unwrap();
        assert!(info.addrs.is_empty());
    }

    #[test]
    fn test_parse_without_peer_id_fails() {
        let err = "/ip4/127.0.0.1/tcp/4001".parse::<AddrInfo>().unwrap_err();
        assert!(matches!(err, NetError::InvalidAddress { .. }));
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!("not-a-multiaddr".parse::<AddrInfo>().is_err());
    }

    #[test]
    fn test_parse_many_merges_same_peer() {
        let addrs = vec![
            format!("/ip4/10.0.0.1/tcp/4001/p2p/{PEER}"),
            format!("/ip4/10.0.0.2/tcp/4001/p2p/{PEER}"),
            "garbage".to_string(),
        ];
        let (infos, errors) = AddrInfo::parse_many(&addrs);
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].addrs.len(), 2);
        assert_eq!(errors.len(), 1);
    }
}
