//! Networking for the skein overlay.
//!
//! A libp2p host (Kademlia for routing, gossipsub for ledger replication,
//! identify for address exchange) driven by a single swarm task, plus the
//! discovery machinery built on top of it: the rotating rendezvous key, the
//! bootstrapper, the DHT discovery loop and the close-peer finder used for
//! relay selection.

pub mod backoff;
pub mod behaviour;
pub mod bootstrap;
pub mod close_peers;
pub mod codec;
pub mod config;
pub mod dht;
pub mod error;
pub mod host;
pub mod network;
pub mod peer_manager;
pub mod protocol;
pub mod rendezvous;

#[cfg(test)]
pub(crate) mod mock;

pub use network::{NetworkHandle, NetworkNode};
