use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use skein_ledger::LedgerConfig;
use skein_net::config::{DiscoveryConfig, NetworkConfig, RelayConfig};
use skein_services::{AliveConfig, RegistryConfig};
use skein_types::constants::{
    DEFAULT_BLOCK_RETENTION, DEFAULT_CONNECT_TIMEOUT, DEFAULT_DISCOVERY_INTERVAL,
    DEFAULT_DISCOVERY_MAX_INTERVAL, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_OTP_DIGITS,
    DEFAULT_OTP_INTERVAL_SECS, DEFAULT_QUERY_TIMEOUT, DEFAULT_QUERY_TTL, DEFAULT_RELAY_PEERS,
    DEFAULT_SCRUB_INTERVAL, DEFAULT_SERVICE_ANNOUNCE_INTERVAL, DEFAULT_STORE_TTL,
    DEFAULT_SYNC_INTERVAL, DEFAULT_WRITE_TIMEOUT, MAX_CONNECTIONS,
};

use crate::error::NodeError;

/// Name of the file `skein init` writes.
pub const CONFIG_FILE: &str = "skein.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub network: NetworkSection,
    pub discovery: DiscoverySection,
    pub ledger: LedgerSection,
    pub alive: AliveSection,
    pub relay: RelaySection,
    pub services: ServicesSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSection {
    /// Overlay name. Peers only replicate ledgers within one network.
    pub network_id: String,
    pub listen_addr: String,
    pub max_connections: usize,
    /// Hex-encoded 32-byte seed for a stable peer identity.
    pub keypair_seed: Option<String>,
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySection {
    /// Shared secret for the rotating rendezvous key.
    pub otp_key: Option<String>,
    pub otp_digits: u32,
    pub otp_interval_secs: u64,
    /// Fixed rendezvous key, used when `otp_key` is unset.
    pub rendezvous: String,
    /// Bootstrap multiaddrs. Empty means the public bootstrap set.
    pub bootstrap_peers: Vec<String>,
    pub interval_secs: u64,
    pub max_interval_secs: u64,
    pub connect_timeout_secs: u64,
    pub query_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSection {
    pub sync_interval_secs: u64,
    pub write_timeout_secs: u64,
    /// Blocks kept in memory behind the head.
    pub retained_blocks: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AliveSection {
    pub enabled: bool,
    pub heartbeat_interval_secs: u64,
    pub write_timeout_secs: u64,
    pub store_ttl_secs: u64,
    pub scrub_interval_secs: u64,
    /// Recency window used when listing available nodes.
    pub query_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySection {
    pub static_relays: Vec<String>,
    pub only_static_relays: bool,
    pub peers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesSection {
    pub announce_interval_secs: u64,
    pub ttl_secs: u64,
    pub publish: Vec<PublishedService>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedService {
    pub name: String,
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            network_id: "skein".to_string(),
            listen_addr: "0.0.0.0:4001".to_string(),
            max_connections: MAX_CONNECTIONS,
            keypair_seed: None,
            idle_timeout_secs: 60,
        }
    }
}

impl Default for DiscoverySection {
    fn default() -> Self {
        Self {
            otp_key: None,
            otp_digits: DEFAULT_OTP_DIGITS,
            otp_interval_secs: DEFAULT_OTP_INTERVAL_SECS,
            rendezvous: "skein".to_string(),
            bootstrap_peers: Vec::new(),
            interval_secs: DEFAULT_DISCOVERY_INTERVAL.as_secs(),
            max_interval_secs: DEFAULT_DISCOVERY_MAX_INTERVAL.as_secs(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT.as_secs(),
            query_timeout_secs: DEFAULT_QUERY_TIMEOUT.as_secs(),
        }
    }
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            sync_interval_secs: DEFAULT_SYNC_INTERVAL.as_secs(),
            write_timeout_secs: DEFAULT_WRITE_TIMEOUT.as_secs(),
            retained_blocks: DEFAULT_BLOCK_RETENTION,
        }
    }
}

impl Default for AliveSection {
    fn default() -> Self {
        Self {
            enabled: true,
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL.as_secs(),
            write_timeout_secs: DEFAULT_WRITE_TIMEOUT.as_secs(),
            store_ttl_secs: DEFAULT_STORE_TTL.as_secs(),
            scrub_interval_secs: DEFAULT_SCRUB_INTERVAL.as_secs(),
            query_ttl_secs: DEFAULT_QUERY_TTL.as_secs(),
        }
    }
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            static_relays: Vec::new(),
            only_static_relays: false,
            peers: DEFAULT_RELAY_PEERS,
        }
    }
}

impl Default for ServicesSection {
    fn default() -> Self {
        Self {
            announce_interval_secs: DEFAULT_SERVICE_ANNOUNCE_INTERVAL.as_secs(),
            ttl_secs: DEFAULT_STORE_TTL.as_secs(),
            publish: Vec::new(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from a TOML file. Missing sections and fields
    /// take their defaults.
    pub fn load(path: &str) -> Result<Self, NodeError> {
        let contents = std::fs::read_to_string(path).map_err(|e| NodeError::ConfigError {
            reason: format!("failed to read config file '{}': {}", path, e),
        })?;
        let config: NodeConfig = toml::from_str(&contents).map_err(|e| NodeError::ConfigError {
            reason: format!("failed to parse config file '{}': {}", path, e),
        })?;
        Ok(config)
    }

    /// Write a default configuration file into `dir`.
    pub fn init(dir: &str) -> Result<(), NodeError> {
        let dir_path = Path::new(dir);
        if !dir_path.exists() {
            std::fs::create_dir_all(dir_path)?;
        }

        let config = NodeConfig::default();
        let toml_str = toml::to_string_pretty(&config).map_err(|e| NodeError::ConfigError {
            reason: format!("failed to serialize default config: {}", e),
        })?;

        std::fs::write(dir_path.join(CONFIG_FILE), toml_str)?;
        Ok(())
    }

    pub fn network_config(&self) -> Result<NetworkConfig, NodeError> {
        let listen_addr: SocketAddr =
            self.network
                .listen_addr
                .parse()
                .map_err(|e| NodeError::ConfigError {
                    reason: format!("invalid listen address '{}': {}", self.network.listen_addr, e),
                })?;

        let keypair_seed = match &self.network.keypair_seed {
            Some(seed_hex) => Some(parse_seed(seed_hex)?),
            None => None,
        };

        Ok(NetworkConfig {
            listen_addr,
            max_connections: self.network.max_connections,
            keypair_seed,
            network_id: self.network.network_id.clone(),
            idle_timeout: secs(self.network.idle_timeout_secs),
            query_timeout: secs(self.discovery.query_timeout_secs),
        })
    }

    pub fn discovery_config(&self) -> DiscoveryConfig {
        let d = &self.discovery;
        DiscoveryConfig {
            otp_key: d.otp_key.clone().filter(|k| !k.is_empty()),
            otp_digits: d.otp_digits,
            otp_interval: d.otp_interval_secs,
            rendezvous: d.rendezvous.clone(),
            bootstrap_peers: d.bootstrap_peers.clone(),
            interval: secs(d.interval_secs),
            max_interval: secs(d.max_interval_secs),
            connect_timeout: secs(d.connect_timeout_secs),
            query_timeout: secs(d.query_timeout_secs),
        }
    }

    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            sync_interval: secs(self.ledger.sync_interval_secs),
            write_timeout: secs(self.ledger.write_timeout_secs),
        }
    }

    pub fn alive_config(&self) -> AliveConfig {
        AliveConfig {
            heartbeat_interval: secs(self.alive.heartbeat_interval_secs),
            write_timeout: secs(self.alive.write_timeout_secs),
            store_ttl: secs(self.alive.store_ttl_secs),
            scrub_interval: secs(self.alive.scrub_interval_secs),
        }
    }

    pub fn query_ttl(&self) -> Duration {
        secs(self.alive.query_ttl_secs)
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            static_relays: self.relay.static_relays.clone(),
            only_static_relays: self.relay.only_static_relays,
            peers: self.relay.peers,
        }
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            announce_interval: secs(self.services.announce_interval_secs),
            write_timeout: secs(self.ledger.write_timeout_secs),
            ttl: secs(self.services.ttl_secs),
        }
    }
}

/// Tokio intervals panic on a zero period, so zero is raised to one second.
fn secs(value: u64) -> Duration {
    Duration::from_secs(value.max(1))
}

fn parse_seed(seed_hex: &str) -> Result<[u8; 32], NodeError> {
    let bytes = hex::decode(seed_hex).map_err(|e| NodeError::ConfigError {
        reason: format!("invalid keypair seed hex: {}", e),
    })?;
    bytes.try_into().map_err(|bytes: Vec<u8>| NodeError::ConfigError {
        reason: format!("keypair seed must be 32 bytes, got {}", bytes.len()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert_eq!(config.network.listen_addr, "0.0.0.0:4001");
        assert!(config.discovery.otp_key.is_none());
        assert!(config.alive.enabled);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let mut config = NodeConfig::default();
        config.services.publish.push(PublishedService {
            name: "web".to_string(),
            address: "127.0.0.1:8080".to_string(),
        });
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let deserialized: NodeConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(deserialized.network.listen_addr, config.network.listen_addr);
        assert_eq!(deserialized.services.publish.len(), 1);
        assert_eq!(
            deserialized.alive.store_ttl_secs,
            config.alive.store_ttl_secs
        );
    }

    #[test]
    fn test_partial_file_takes_defaults() {
        let config: NodeConfig = toml::from_str(
            r#"
            [discovery]
            otp_key = "secret"
            otp_digits = 6
            otp_interval_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.discovery.otp_digits, 6);
        assert_eq!(config.discovery.rendezvous, "skein");
        assert_eq!(config.ledger.sync_interval_secs, DEFAULT_SYNC_INTERVAL.as_secs());
        assert_eq!(config.ledger.retained_blocks, DEFAULT_BLOCK_RETENTION);

        let discovery = config.discovery_config();
        assert_eq!(discovery.otp_key.as_deref(), Some("secret"));
        assert_eq!(discovery.otp_interval, 5);
    }

    #[test]
    fn test_empty_otp_key_means_static_rendezvous() {
        let mut config = NodeConfig::default();
        config.discovery.otp_key = Some(String::new());
        assert!(config.discovery_config().otp_key.is_none());
    }

    #[test]
    fn test_init_creates_config_file() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().to_str().unwrap();
        NodeConfig::init(dir).unwrap();

        let config_path = tmp.path().join(CONFIG_FILE);
        assert!(config_path.exists());

        let contents = std::fs::read_to_string(config_path).unwrap();
        let _config: NodeConfig = toml::from_str(&contents).unwrap();
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = NodeConfig::load("/nonexistent/path/skein.toml");
        assert!(matches!(result, Err(NodeError::ConfigError { .. })));
    }

    #[test]
    fn test_load_valid_config() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().to_str().unwrap();
        NodeConfig::init(dir).unwrap();

        let config_path = tmp.path().join(CONFIG_FILE);
        let config = NodeConfig::load(config_path.to_str().unwrap()).unwrap();
        assert_eq!(config.network.listen_addr, "0.0.0.0:4001");
    }

    #[test]
    fn test_network_config_parses_seed() {
        let mut config = NodeConfig::default();
        config.network.keypair_seed = Some("ab".repeat(32));
        let network = config.network_config().unwrap();
        assert_eq!(network.keypair_seed, Some([0xab; 32]));
    }

    #[test]
    fn test_network_config_rejects_bad_seed() {
        let mut config = NodeConfig::default();
        config.network.keypair_seed = Some("not-hex".to_string());
        assert!(config.network_config().is_err());

        config.network.keypair_seed = Some("abcd".to_string());
        assert!(config.network_config().is_err());
    }

    #[test]
    fn test_network_config_rejects_bad_listen_addr() {
        let mut config = NodeConfig::default();
        config.network.listen_addr = "nowhere".to_string();
        assert!(config.network_config().is_err());
    }

    #[test]
    fn test_zero_intervals_are_raised() {
        let mut config = NodeConfig::default();
        config.alive.heartbeat_interval_secs = 0;
        assert_eq!(config.alive_config().heartbeat_interval, Duration::from_secs(1));
    }
}
