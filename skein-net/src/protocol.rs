/// Wire protocol version. Bump this whenever a breaking change is made to
/// `LedgerMessage` or any borsh-serialized gossip type.
pub const PROTOCOL_VERSION: u8 = 1;

/// Protocol string announced through identify.
pub const IDENTIFY_PROTOCOL: &str = "/skein/1.0.0";

/// Base name of the gossipsub topic carrying ledger traffic.
pub const LEDGER_TOPIC: &str = "skein/ledger";

/// Build a versioned topic string: `"{base}/v{version}"`.
pub fn versioned_topic(base: &str, version: u8) -> String {
    format!("{}/v{}", base, version)
}

/// Ledger topic scoped to one overlay network.
pub fn ledger_topic(network_id: &str) -> String {
    versioned_topic(&format!("{}/{}", LEDGER_TOPIC, network_id), PROTOCOL_VERSION)
}
