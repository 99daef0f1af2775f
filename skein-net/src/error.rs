use std::time::Duration;

use thiserror::Error;

/// Errors that can occur in the network layer.
#[derive(Debug, Error)]
pub enum NetError {
    /// A general network-level error.
    #[error("network error: {reason}")]
    NetworkError { reason: String },

    /// Failed to encode or decode a message.
    #[error("codec error: {reason}")]
    CodecError { reason: String },

    /// Failed to establish a connection.
    #[error("dial {peer} failed: {reason}")]
    DialFailed { peer: String, reason: String },

    /// An address could not be parsed or resolved to a peer.
    #[error("invalid address '{addr}': {reason}")]
    InvalidAddress { addr: String, reason: String },

    /// The requested peer was not found.
    #[error("peer not found: {peer}")]
    PeerNotFound { peer: String },

    /// The routing table is empty, so a DHT query cannot start.
    #[error("no known peers in the routing table")]
    NoKnownPeers,

    /// A bounded operation did not complete in time.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// Message exceeds maximum allowed size.
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Protocol-level error.
    #[error("protocol error: {reason}")]
    ProtocolError { reason: String },

    /// Channel send/receive error.
    #[error("channel error: {reason}")]
    ChannelError { reason: String },

    /// Peer is running an incompatible protocol version.
    #[error("protocol version mismatch: peer sent v{peer}, we run v{ours}")]
    VersionMismatch { peer: u8, ours: u8 },
}

/// Errors surfaced when starting discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The routing table could not be created. Nothing useful can run
    /// without it, so this is the only error that leaves discovery.
    #[error("dht initialisation failed: {reason}")]
    DhtInit { reason: String },

    #[error("invalid rendezvous configuration: {0}")]
    Rendezvous(#[from] skein_types::error::TypeError),
}
