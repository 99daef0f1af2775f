use thiserror::Error;

/// Errors raised while validating shared types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    #[error("invalid otp digit count {digits}: must be between 1 and {max}")]
    InvalidOtpDigits { digits: u32, max: u32 },

    #[error("invalid otp interval: must be at least one second")]
    InvalidOtpInterval,

    #[error("empty bucket name")]
    EmptyBucket,
}
