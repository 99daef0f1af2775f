//! Replicated ledger for the skein overlay network.
//!
//! An append-only sequence of full-snapshot blocks, written through a single
//! serialized commit path per process and replicated between peers by gossip.
//! Entries carry an optional expiry: expired entries are invisible to reads
//! immediately and are physically removed by [`Ledger::scrub`].

pub mod block;
pub mod clock;
pub mod config;
pub mod error;
pub mod gossip;
pub mod ledger;
pub mod sync;

pub use config::LedgerConfig;
pub use ledger::{Ledger, MergeOutcome};
