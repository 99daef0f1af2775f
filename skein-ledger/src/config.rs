use std::time::Duration;

use skein_types::constants::{DEFAULT_SYNC_INTERVAL, DEFAULT_WRITE_TIMEOUT};

/// Tuning knobs for ledger replication.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// How often the latest block is re-announced to peers.
    pub sync_interval: Duration,
    /// Bound on a single write issued by the node itself.
    pub write_timeout: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            sync_interval: DEFAULT_SYNC_INTERVAL,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}
