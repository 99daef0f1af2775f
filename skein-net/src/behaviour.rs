use std::time::Duration;

use libp2p::gossipsub;
use libp2p::identity::Keypair;
use libp2p::kad;
use libp2p::swarm::NetworkBehaviour;
use skein_types::constants::MAX_MESSAGE_SIZE;

use crate::protocol::IDENTIFY_PROTOCOL;

/// Combined network behaviour of a skein peer.
#[derive(NetworkBehaviour)]
pub struct SkeinBehaviour {
    /// Gossipsub for ledger replication.
    pub gossipsub: gossipsub::Behaviour,
    /// Kademlia DHT for rendezvous discovery and relay selection.
    pub kademlia: kad::Behaviour<kad::store::MemoryStore>,
    /// Identify protocol for peer identification and address exchange.
    pub identify: libp2p::identify::Behaviour,
}

/// Build a SkeinBehaviour from a keypair.
///
/// Returns `Result<SkeinBehaviour, Box<dyn Error + Send + Sync>>` to conform
/// to the `TryIntoBehaviour` trait expected by `SwarmBuilder::with_behaviour`.
pub fn build_behaviour(
    keypair: &Keypair,
    query_timeout: Duration,
) -> Result<SkeinBehaviour, Box<dyn std::error::Error + Send + Sync>> {
    // --- Gossipsub ---
    let message_id_fn = |message: &gossipsub::Message| {
        // Deduplicate based on content hash.
        let hash = blake3::hash(&message.data);
        gossipsub::MessageId::from(hash.as_bytes().to_vec())
    };

    let gossipsub_config = gossipsub::ConfigBuilder::default()
        .heartbeat_interval(Duration::from_secs(1))
        .validation_mode(gossipsub::ValidationMode::Strict)
        .max_transmit_size(MAX_MESSAGE_SIZE)
        .message_id_fn(message_id_fn)
        .build()
        .map_err(|e| format!("gossipsub config: {}", e))?;

    let gossipsub = gossipsub::Behaviour::new(
        gossipsub::MessageAuthenticity::Signed(keypair.clone()),
        gossipsub_config,
    )
    .map_err(|e| format!("gossipsub behaviour: {}", e))?;

    // --- Kademlia ---
    // The public IPFS protocol name, so the well-known bootstrap peers can
    // seed the routing table.
    let local_peer_id = keypair.public().to_peer_id();
    let mut kad_config = kad::Config::new(kad::PROTOCOL_NAME);
    kad_config.set_query_timeout(query_timeout);
    let store = kad::store::MemoryStore::new(local_peer_id);
    let mut kademlia = kad::Behaviour::with_config(local_peer_id, store, kad_config);
    // Without a confirmed external address kad stays a client and refuses
    // inbound provider records, so peers could never meet on a rendezvous key.
    kademlia.set_mode(Some(kad::Mode::Server));

    // --- Identify ---
    let identify = libp2p::identify::Behaviour::new(
        libp2p::identify::Config::new(IDENTIFY_PROTOCOL.to_string(), keypair.public())
            .with_agent_version(format!("skein/{}", env!("CARGO_PKG_VERSION"))),
    );

    Ok(SkeinBehaviour {
        gossipsub,
        kademlia,
        identify,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kademlia_serves_inbound_requests() {
        let keypair = Keypair::generate_ed25519();
        let behaviour = build_behaviour(&keypair, Duration::from_secs(10)).unwrap();
        assert_eq!(behaviour.kademlia.mode(), kad::Mode::Server);
    }
}
