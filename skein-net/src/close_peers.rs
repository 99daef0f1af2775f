use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::RelayConfig;
use crate::dht::Dht;
use crate::host::AddrInfo;

/// Offers relay candidates: DHT peers closest to us, then static relays.
pub struct ClosePeerFinder {
    dht: Arc<Dht>,
    static_relays: Vec<String>,
    only_static_relays: bool,
    peers: usize,
}

impl ClosePeerFinder {
    pub fn new(dht: Arc<Dht>, config: &RelayConfig) -> Self {
        Self {
            dht,
            static_relays: config.static_relays.clone(),
            only_static_relays: config.only_static_relays,
            peers: config.peers,
        }
    }

    /// Number of candidates requested by [`ClosePeerFinder::find_default`].
    pub fn peers(&self) -> usize {
        self.peers
    }

    /// Stream the configured number of relay candidates.
    pub fn find_default(&self) -> mpsc::Receiver<AddrInfo> {
        self.find(self.peers)
    }

    /// Stream up to `num_peers` relay candidates.
    ///
    /// The stream closes once every candidate was sent. If the closest-peer
    /// query fails the stream closes empty, static relays included. When
    /// more candidates than requested are known, one fewer than requested is
    /// delivered.
    pub fn find(&self, num_peers: usize) -> mpsc::Receiver<AddrInfo> {
        let (tx, rx) = mpsc::channel(num_peers.max(1));
        let dht = self.dht.clone();
        let static_relays = self.static_relays.clone();
        let only_static = self.only_static_relays;

        tokio::spawn(async move {
            let mut candidates = Vec::new();

            if !only_static {
                match dht.routing().await {
                    Some(routing) => {
                        let closest =
                            match timeout(dht.query_timeout(), routing.closest_peers()).await {
                                Ok(Ok(peers)) => peers,
                                Ok(Err(e)) => {
                                    warn!("failed getting closest peers: {}", e);
                                    return;
                                }
                                Err(_) => {
                                    warn!("closest peer query timed out");
                                    return;
                                }
                            };
                        for peer_id in closest {
                            let addrs = dht.host().known_addresses(&peer_id);
                            if !addrs.is_empty() {
                                candidates.push(AddrInfo::new(peer_id, addrs));
                            }
                        }
                    }
                    None => debug!("dht not started, offering static relays only"),
                }
            }

            for raw in &static_relays {
                match raw.parse::<AddrInfo>() {
                    Ok(info) => candidates.push(info),
                    Err(e) => warn!("skipping static relay: {}", e),
                }
            }

            if candidates.len() > num_peers {
                candidates.truncate(num_peers.saturating_sub(1));
            }

            for info in candidates {
                if tx.send(info).await.is_err() {
                    debug!("close peer receiver dropped");
                    return;
                }
            }
        });

        rx
    }
}

/// Drain a candidate stream, waiting at most `wait` in total.
pub async fn collect_candidates(
    mut rx: mpsc::Receiver<AddrInfo>,
    wait: Duration,
) -> Vec<AddrInfo> {
    let mut out = Vec::new();
    let _ = timeout(wait, async {
        while let Some(info) = rx.recv().await {
            out.push(info);
        }
    })
    .await;
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiscoveryConfig;
    use crate::host::Host;
    use crate::mock::{test_addr, MockDht, MockHost, MockProvider, MockRouting};
    use libp2p::PeerId;

    const WAIT: Duration = Duration::from_secs(5);

    struct Fixture {
        host: Arc<MockHost>,
        routing: Arc<MockRouting>,
        dht: Arc<Dht>,
    }

    fn fixture() -> Fixture {
        let host = Arc::new(MockHost::new());
        let me = AddrInfo::new(host.identity(), vec![test_addr(1)]);
        let routing = Arc::new(MockRouting::new(me, MockDht::default()));
        let provider = Arc::new(MockProvider::new(routing.clone()));
        let dht = Arc::new(Dht::new(&DiscoveryConfig::default(), host.clone(), provider).unwrap());
        Fixture { host, routing, dht }
    }

    fn relays(n: u16) -> Vec<String> {
        (0..n)
            .map(|i| format!("/ip4/10.0.0.{}/tcp/4001/p2p/{}", i + 1, PeerId::random()))
            .collect()
    }

    fn relay_config(static_relays: Vec<String>, only_static_relays: bool) -> RelayConfig {
        RelayConfig {
            static_relays,
            only_static_relays,
            peers: 5,
        }
    }

    fn known_peer(f: &Fixture, port: u16) -> PeerId {
        let peer = PeerId::random();
        f.host.add_addresses(peer, vec![test_addr(port)]);
        peer
    }

    #[tokio::test]
    async fn test_static_relays_when_dht_is_empty() {
        let f = fixture();
        f.dht.start().await.unwrap();
        let finder = ClosePeerFinder::new(f.dht.clone(), &relay_config(relays(3), false));

        let found = collect_candidates(finder.find(5), WAIT).await;
        assert_eq!(found.len(), 3);
    }

    #[tokio::test]
    async fn test_dht_peers_come_before_static_relays() {
        let f = fixture();
        f.dht.start().await.unwrap();
        let near = known_peer(&f, 10);
        f.routing.set_closest(Some(vec![near]));
        let finder = ClosePeerFinder::new(f.dht.clone(), &relay_config(relays(1), false));

        let found = collect_candidates(finder.find(5), WAIT).await;
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].peer_id, near);
        assert_eq!(found[0].addrs, vec![test_addr(10)]);
    }

    #[tokio::test]
    async fn test_oversupply_truncates_to_one_fewer() {
        let f = fixture();
        f.dht.start().await.unwrap();
        let closest = vec![known_peer(&f, 10), known_peer(&f, 11)];
        f.routing.set_closest(Some(closest));
        let finder = ClosePeerFinder::new(f.dht.clone(), &relay_config(relays(4), false));

        let found = collect_candidates(finder.find(5), WAIT).await;
        assert_eq!(found.len(), 4);
    }

    #[tokio::test]
    async fn test_exact_supply_is_not_truncated() {
        let f = fixture();
        f.dht.start().await.unwrap();
        let finder = ClosePeerFinder::new(f.dht.clone(), &relay_config(relays(5), false));

        let found = collect_candidates(finder.find(5), WAIT).await;
        assert_eq!(found.len(), 5);
    }

    #[tokio::test]
    async fn test_query_failure_closes_stream_empty() {
        let f = fixture();
        f.dht.start().await.unwrap();
        f.routing.set_closest(None);
        let finder = ClosePeerFinder::new(f.dht.clone(), &relay_config(relays(3), false));

        let mut rx = finder.find(5);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_only_static_skips_dht() {
        let f = fixture();
        f.dht.start().await.unwrap();
        // A failing query would close the stream if it were consulted.
        f.routing.set_closest(None);
        let finder = ClosePeerFinder::new(f.dht.clone(), &relay_config(relays(2), true));

        let found = collect_candidates(finder.find(5), WAIT).await;
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn test_peers_without_addresses_are_skipped() {
        let f = fixture();
        f.dht.start().await.unwrap();
        let addressed = known_peer(&f, 10);
        f.routing.set_closest(Some(vec![PeerId::random(), addressed]));
        let finder = ClosePeerFinder::new(f.dht.clone(), &relay_config(Vec::new(), false));

        let found = collect_candidates(finder.find(5), WAIT).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].peer_id, addressed);
    }

    #[tokio::test]
    async fn test_unstarted_dht_offers_static_relays() {
        let f = fixture();
        let finder = ClosePeerFinder::new(f.dht.clone(), &relay_config(relays(2), false));

        let found = collect_candidates(finder.find(3), WAIT).await;
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_static_relay_is_skipped() {
        let f = fixture();
        let mut configured = relays(1);
        configured.push("not-an-address".to_string());
        let finder = ClosePeerFinder::new(f.dht.clone(), &relay_config(configured, true));

        let found = collect_candidates(finder.find(3), WAIT).await;
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_configured_count_drives_truncation() {
        let f = fixture();
        f.dht.start().await.unwrap();
        let config = RelayConfig {
            static_relays: relays(5),
            only_static_relays: false,
            peers: 3,
        };
        let finder = ClosePeerFinder::new(f.dht.clone(), &config);
        assert_eq!(finder.peers(), 3);

        let found = collect_candidates(finder.find_default(), WAIT).await;
        assert_eq!(found.len(), 2);
    }
}
