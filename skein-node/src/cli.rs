use std::path::Path;

use clap::{Args, Parser, Subcommand};
use rand::RngCore;

use crate::config::{NodeConfig, CONFIG_FILE};
use crate::error::NodeError;

#[derive(Parser)]
#[command(
    name = "skein",
    about = "skein peer: DHT rendezvous discovery, replicated ledger and liveness",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the node
    Start(StartArgs),
    /// Write a default configuration file
    Init {
        /// Output directory
        #[arg(short, long, default_value = ".")]
        dir: String,
    },
    /// Print a fresh random shared secret for the rotating rendezvous key
    GenSecret {
        /// Secret length in bytes
        #[arg(long, default_value_t = 32)]
        bytes: usize,
    },
}

#[derive(Args, Default)]
pub struct StartArgs {
    /// Path to config file. Defaults to ./skein.toml when present.
    #[arg(short, long)]
    pub config: Option<String>,
    /// Override the listen address (e.g. "0.0.0.0:4001")
    #[arg(long)]
    pub listen: Option<String>,
    /// Override the network name
    #[arg(long)]
    pub network_id: Option<String>,
    /// Shared secret for the rotating rendezvous key
    #[arg(long, env = "SKEIN_OTP_KEY")]
    pub otp_key: Option<String>,
    /// Fixed rendezvous key, used without a shared secret
    #[arg(long)]
    pub rendezvous: Option<String>,
    /// Bootstrap multiaddr (can be specified multiple times)
    #[arg(long = "bootstrap")]
    pub bootstrap_peers: Vec<String>,
    /// Static relay multiaddr (can be specified multiple times)
    #[arg(long = "relay")]
    pub static_relays: Vec<String>,
    /// Only offer static relays, never DHT peers
    #[arg(long)]
    pub only_static_relays: bool,
    /// Hex-encoded 32-byte seed for a stable peer identity
    #[arg(long)]
    pub keypair_seed: Option<String>,
    /// Disable the liveness heartbeat
    #[arg(long)]
    pub no_alive: bool,
    /// Log filter used when RUST_LOG is unset
    #[arg(long)]
    pub log_level: Option<String>,
}

impl StartArgs {
    /// Load the configured file (or defaults) and apply flag overrides.
    pub fn resolve(self) -> Result<NodeConfig, NodeError> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::load(path)?,
            None if Path::new(CONFIG_FILE).exists() => NodeConfig::load(CONFIG_FILE)?,
            None => NodeConfig::default(),
        };
        self.apply(&mut config);
        Ok(config)
    }

    fn apply(self, config: &mut NodeConfig) {
        if let Some(addr) = self.listen {
            config.network.listen_addr = addr;
        }
        if let Some(id) = self.network_id {
            config.network.network_id = id;
        }
        if let Some(key) = self.otp_key {
            config.discovery.otp_key = Some(key);
        }
        if let Some(key) = self.rendezvous {
            config.discovery.rendezvous = key;
        }
        if !self.bootstrap_peers.is_empty() {
            config.discovery.bootstrap_peers = self.bootstrap_peers;
        }
        if !self.static_relays.is_empty() {
            config.relay.static_relays.extend(self.static_relays);
        }
        if self.only_static_relays {
            config.relay.only_static_relays = true;
        }
        if let Some(seed) = self.keypair_seed {
            config.network.keypair_seed = Some(seed);
        }
        if self.no_alive {
            config.alive.enabled = false;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
    }
}

pub async fn run(cli: Cli) -> Result<(), NodeError> {
    match cli.command {
        Command::Start(args) => {
            let config = args.resolve()?;
            crate::logging::init(&config.logging.level);

            let mut node = crate::node::Node::new(config).await?;
            node.run().await
        }
        Command::Init { dir } => {
            crate::logging::init("info");
            NodeConfig::init(&dir)?;
            tracing::info!("Node configuration initialized in {}", dir);
            Ok(())
        }
        Command::GenSecret { bytes } => {
            println!("{}", generate_secret(bytes)?);
            Ok(())
        }
    }
}

/// A random hex secret of `bytes` bytes.
pub fn generate_secret(bytes: usize) -> Result<String, NodeError> {
    if bytes < 16 {
        return Err(NodeError::ConfigError {
            reason: format!("secret must be at least 16 bytes, got {}", bytes),
        });
    }
    let mut secret = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut secret);
    Ok(hex::encode(secret))
}
