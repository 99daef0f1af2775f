//! Time-based one-time codes (RFC 6238, HMAC-SHA1) on top of `totp-rs`.
//!
//! The secret is used as raw key bytes. Codes are zero-padded to the requested
//! number of digits; for more than nine digits the code is the full 31-bit
//! truncated value, so the leading positions are always zero.

use skein_types::constants::MAX_OTP_DIGITS;
use skein_types::error::TypeError;
use totp_rs::{Algorithm, TOTP};

/// Widest code `TOTP::generate` can reduce without overflowing `10^digits`.
const GENERATE_MAX_DIGITS: u32 = 9;

/// A TOTP generator over a shared secret.
#[derive(Debug, Clone)]
pub struct Totp {
    inner: TOTP,
    digits: u32,
    interval: u64,
}

impl Totp {
    /// Create a generator with the given digit count and step interval (seconds).
    pub fn new(secret: impl AsRef<[u8]>, digits: u32, interval: u64) -> Result<Self, TypeError> {
        if digits == 0 || digits > MAX_OTP_DIGITS {
            return Err(TypeError::InvalidOtpDigits {
                digits,
                max: MAX_OTP_DIGITS,
            });
        }
        if interval == 0 {
            return Err(TypeError::InvalidOtpInterval);
        }
        // The checked constructor insists on 6..=8 digits and a 128-bit secret.
        let inner = TOTP::new_unchecked(
            Algorithm::SHA1,
            digits as usize,
            0,
            interval,
            secret.as_ref().to_vec(),
        );
        Ok(Self {
            inner,
            digits,
            interval,
        })
    }

    /// The time step a UNIX time (seconds) falls into.
    pub fn step(&self, unix_secs: u64) -> u64 {
        unix_secs / self.interval
    }

    /// The code valid at the given UNIX time (seconds).
    pub fn at(&self, unix_secs: u64) -> String {
        if self.digits <= GENERATE_MAX_DIGITS {
            return self.inner.generate(unix_secs);
        }
        let value = truncate(&self.inner.sign(unix_secs));
        format!("{:0width$}", value, width = self.digits as usize)
    }

    /// The code valid right now.
    pub fn now(&self) -> String {
        let secs = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.at(secs)
    }
}

/// Counter-based one-time code (RFC 4226): a TOTP with a one-second step.
pub fn hotp(secret: &[u8], digits: u32, counter: u64) -> String {
    let digits = digits.clamp(1, MAX_OTP_DIGITS);
    match Totp::new(secret, digits, 1) {
        Ok(totp) => totp.at(counter),
        Err(_) => String::new(),
    }
}

/// RFC 4226 dynamic truncation of an HMAC digest to 31 bits.
fn truncate(digest: &[u8]) -> u32 {
    let Some(last) = digest.last() else {
        return 0;
    };
    let offset = usize::from(last & 0x0f);
    match digest.get(offset..offset + 4) {
        Some(&[a, b, c, d]) => u32::from_be_bytes([a & 0x7f, b, c, d]),
        _ => 0,
    }
}
