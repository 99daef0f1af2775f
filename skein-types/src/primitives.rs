use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// 32-byte BLAKE3 hash.
pub type Hash = [u8; 32];

/// Unix timestamp in milliseconds.
pub type Timestamp = u64;

/// Index of a block in the ledger (strictly increasing).
pub type BlockIndex = u64;

/// The all-zero hash, used as `prev_hash` of the genesis block.
pub const ZERO_HASH: Hash = [0u8; 32];

/// Current wall-clock time as a UNIX timestamp in milliseconds.
pub fn now_millis() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as Timestamp
}

/// Convert a duration into milliseconds, saturating on overflow.
pub fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
