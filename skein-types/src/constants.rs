use std::time::Duration;

// ─── Rendezvous Parameters ───────────────────────────────────────────────────

/// Default number of digits of the rotating one-time code.
pub const DEFAULT_OTP_DIGITS: u32 = 12;

/// Default rotation interval of the one-time code (seconds).
pub const DEFAULT_OTP_INTERVAL_SECS: u64 = 9_000; // 2.5 hours

/// Largest digit count a 64-bit code can carry.
pub const MAX_OTP_DIGITS: u32 = 19;

// ─── Discovery Parameters ────────────────────────────────────────────────────

/// First delay of the discovery connect-cycle timer.
pub const DEFAULT_DISCOVERY_INTERVAL: Duration = Duration::from_secs(5);

/// Ceiling the discovery timer backs off towards.
pub const DEFAULT_DISCOVERY_MAX_INTERVAL: Duration = Duration::from_secs(120);

/// Bound on a single dial attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Bound on a single DHT query (advertise, search, closest peers).
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(60);

/// Well-known public bootstrap peers, used when none are configured.
pub const DEFAULT_BOOTSTRAP_PEERS: &[&str] = &[
    "/dnsaddr/bootstrap.libp2p.io/p2p/QmNnooDu7bfjPFoTZYxMNLWUQJyrVwtbZg5gBMjTezGAJN",
    "/dnsaddr/bootstrap.libp2p.io/p2p/QmQCU2EcMqAqQPR2i9bChDtGNJchTbq5TbXJJ16u19uLTa",
    "/dnsaddr/bootstrap.libp2p.io/p2p/QmbLHAnMoJPWSCR5Zhtx6BHJX9KiKNN6tpvbUcqanj75Nb",
    "/dnsaddr/bootstrap.libp2p.io/p2p/QmcZf59bWwK5XFi76CZX8cbJ4BhTzzA3gU1ZjYZcYW3dwt",
    "/ip4/104.131.131.82/tcp/4001/p2p/QmaCpDMGvV2BGHeYERUEnrLnKoMnCqxQJWWz2e1qyF1ZTo",
];

// ─── Ledger Parameters ───────────────────────────────────────────────────────

/// Bucket holding liveness heartbeats, keyed by peer identity.
pub const LIVENESS_BUCKET: &str = "healthcheck";

/// Bucket holding published services, keyed by service name.
pub const SERVICES_BUCKET: &str = "services";

/// How often the ledger re-announces its latest block.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(10);

/// Default bound on a single ledger write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

// ─── Liveness Parameters ─────────────────────────────────────────────────────

/// How often a peer refreshes its heartbeat.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(120);

/// Lifetime of a heartbeat record before it expires.
pub const DEFAULT_STORE_TTL: Duration = Duration::from_secs(600);

/// Recency window applied by availability queries.
pub const DEFAULT_QUERY_TTL: Duration = Duration::from_secs(900);

/// How often expired ledger entries are physically removed.
pub const DEFAULT_SCRUB_INTERVAL: Duration = Duration::from_secs(60);

/// Blocks an in-memory store keeps behind the head.
pub const DEFAULT_BLOCK_RETENTION: usize = 16;

/// How often a published service is re-announced.
pub const DEFAULT_SERVICE_ANNOUNCE_INTERVAL: Duration = Duration::from_secs(60);

// ─── Network Parameters ──────────────────────────────────────────────────────

/// Maximum gossip message size in bytes.
pub const MAX_MESSAGE_SIZE: usize = 4_194_304; // 4 MB

/// Default number of simultaneous connections.
pub const MAX_CONNECTIONS: usize = 128;

/// Default number of close peers requested for relay selection.
pub const DEFAULT_RELAY_PEERS: usize = 5;
