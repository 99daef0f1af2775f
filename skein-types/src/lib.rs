//! Shared type definitions for the skein overlay network.
//!
//! Everything that crosses a crate boundary lives here: the ledger data model
//! (blocks, buckets, entries), the gossip message envelope, primitives and
//! protocol-wide constants.

pub mod constants;
pub mod error;
pub mod ledger;
pub mod network;
pub mod primitives;
