use std::time::Duration;

use futures::future::join_all;
use skein_types::constants::DEFAULT_BOOTSTRAP_PEERS;
use tracing::{debug, warn};

use crate::host::{AddrInfo, Connectedness, Host};

/// Peers dialled to get an initial view into the DHT.
#[derive(Debug, Clone, Default)]
pub struct BootstrapList {
    peers: Vec<AddrInfo>,
}

impl BootstrapList {
    /// Parse configured bootstrap multiaddrs. Invalid entries are logged and
    /// skipped. An empty configuration selects the well-known public peers.
    pub fn new(addrs: &[String]) -> Self {
        if addrs.is_empty() {
            return Self::parse(DEFAULT_BOOTSTRAP_PEERS);
        }
        Self::parse(addrs)
    }

    fn parse<S: AsRef<str>>(addrs: &[S]) -> Self {
        let (peers, errors) = AddrInfo::parse_many(addrs);
        for e in errors {
            warn!("skipping bootstrap peer: {}", e);
        }
        Self { peers }
    }

    /// Return the parsed bootstrap peers.
    pub fn peers(&self) -> &[AddrInfo] {
        &self.peers
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

/// Dial every bootstrap peer that is not already connected, concurrently,
/// and wait for all attempts. Failures are logged and otherwise ignored.
/// Returns the number of peers connected by this call.
pub async fn connect_bootstrap_peers(
    host: &dyn Host,
    peers: &[AddrInfo],
    connect_timeout: Duration,
) -> usize {
    let attempts = peers.iter().map(|info| async move {
        if host.connectedness(&info.peer_id) == Connectedness::Connected {
            return false;
        }
        match tokio::time::timeout(connect_timeout, host.connect(info.clone())).await {
            Ok(Ok(())) => {
                debug!(peer = %info.peer_id, "connected to bootstrap peer");
                true
            }
            Ok(Err(e)) => {
                debug!(peer = %info.peer_id, "bootstrap dial failed: {}", e);
                false
            }
            Err(_) => {
                debug!(peer = %info.peer_id, "bootstrap dial timed out");
                false
            }
        }
    });

    join_all(attempts).await.into_iter().filter(|ok| *ok).count()
}
