//! Services built on the skein ledger.
//!
//! The liveness service keeps a heartbeat for this peer in the shared
//! ledger and periodically scrubs expired records; the registry publishes
//! named services the same way. Both are plain background tasks driven by a
//! shared shutdown signal.

pub mod alive;
pub mod error;
pub mod registry;

pub use alive::{available_nodes, AliveConfig, AliveService};
pub use registry::{available_services, RegistryConfig, ServiceRecord, ServiceRegistry};
