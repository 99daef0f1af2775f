use thiserror::Error;

/// Errors that can occur in the node.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("config error: {reason}")]
    ConfigError { reason: String },

    #[error("network error: {0}")]
    NetworkError(#[from] skein_net::error::NetError),

    #[error("discovery error: {0}")]
    DiscoveryError(#[from] skein_net::error::DiscoveryError),

    #[error("ledger error: {0}")]
    LedgerError(#[from] skein_ledger::error::LedgerError),

    #[error("service error: {0}")]
    ServiceError(#[from] skein_services::error::ServiceError),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}
