use thiserror::Error;

/// Errors that can occur in ledger-backed services.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] skein_ledger::error::LedgerError),

    #[error("Malformed service record {name}: {reason}")]
    MalformedRecord { name: String, reason: String },

    #[error("Invalid service name: {reason}")]
    InvalidName { reason: String },
}
