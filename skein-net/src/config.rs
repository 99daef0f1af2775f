use std::net::SocketAddr;
use std::time::Duration;

use skein_types::constants::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_DISCOVERY_INTERVAL, DEFAULT_DISCOVERY_MAX_INTERVAL,
    DEFAULT_OTP_DIGITS, DEFAULT_OTP_INTERVAL_SECS, DEFAULT_QUERY_TIMEOUT, DEFAULT_RELAY_PEERS,
    MAX_CONNECTIONS,
};

/// Configuration for the libp2p host.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Address to listen on.
    pub listen_addr: SocketAddr,
    /// Maximum number of connections.
    pub max_connections: usize,
    /// Optional keypair seed (32 bytes). If None, generates random.
    pub keypair_seed: Option<[u8; 32]>,
    /// Name of the overlay. Peers on different networks ignore each
    /// other's ledger traffic.
    pub network_id: String,
    /// How long an idle connection is kept open.
    pub idle_timeout: Duration,
    /// Bound on a single Kademlia query.
    pub query_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: ([0, 0, 0, 0], 0).into(),
            max_connections: MAX_CONNECTIONS,
            keypair_seed: None,
            network_id: "skein".to_string(),
            idle_timeout: Duration::from_secs(60),
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }
}

/// Configuration for rendezvous discovery.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Shared secret for the rotating rendezvous key. Takes precedence over
    /// `rendezvous` when set.
    pub otp_key: Option<String>,
    /// Digits of the one-time code.
    pub otp_digits: u32,
    /// Rotation interval of the one-time code, in seconds.
    pub otp_interval: u64,
    /// Static rendezvous key, used when no shared secret is configured.
    pub rendezvous: String,
    /// Bootstrap multiaddrs (with a trailing `/p2p/<peer id>`). Empty means
    /// the well-known public set.
    pub bootstrap_peers: Vec<String>,
    /// First delay of the connect-cycle timer.
    pub interval: Duration,
    /// Ceiling of the connect-cycle timer.
    pub max_interval: Duration,
    /// Bound on a single dial.
    pub connect_timeout: Duration,
    /// Bound on a single advertise or search.
    pub query_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            otp_key: None,
            otp_digits: DEFAULT_OTP_DIGITS,
            otp_interval: DEFAULT_OTP_INTERVAL_SECS,
            rendezvous: "skein".to_string(),
            bootstrap_peers: Vec::new(),
            interval: DEFAULT_DISCOVERY_INTERVAL,
            max_interval: DEFAULT_DISCOVERY_MAX_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }
}

/// Configuration for relay selection.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Statically configured relay multiaddrs.
    pub static_relays: Vec<String>,
    /// Skip the DHT and only offer the static relays.
    pub only_static_relays: bool,
    /// Default number of close peers requested.
    pub peers: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            static_relays: Vec::new(),
            only_static_relays: false,
            peers: DEFAULT_RELAY_PEERS,
        }
    }
}
