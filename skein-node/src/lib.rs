//! The `skein` peer: configuration, CLI and the node that wires discovery,
//! the replicated ledger and the liveness service together.

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod node;
