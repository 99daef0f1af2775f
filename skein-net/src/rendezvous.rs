use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use skein_crypto::hash::fingerprint;
use skein_crypto::otp::Totp;
use skein_types::error::TypeError;

use crate::config::DiscoveryConfig;

enum Source {
    Static(String),
    Rotating(Totp),
}

/// Produces the key peers advertise and search under in the DHT.
///
/// With a shared secret the key is the fingerprint of the current one-time
/// code, so it rotates every interval and never reveals the secret. The key
/// handed out last is remembered so a discovery round can keep serving it
/// across a rotation.
pub struct Rendezvous {
    source: Source,
    latest: Mutex<Option<String>>,
}

impl Rendezvous {
    /// A fixed key.
    pub fn fixed(key: impl Into<String>) -> Self {
        Self {
            source: Source::Static(key.into()),
            latest: Mutex::new(None),
        }
    }

    /// A key rotating with the one-time code of `secret`.
    pub fn rotating(secret: &str, digits: u32, interval: u64) -> Result<Self, TypeError> {
        Ok(Self {
            source: Source::Rotating(Totp::new(secret, digits, interval)?),
            latest: Mutex::new(None),
        })
    }

    pub fn from_config(config: &DiscoveryConfig) -> Result<Self, TypeError> {
        match config.otp_key.as_deref() {
            Some(secret) if !secret.is_empty() => {
                Self::rotating(secret, config.otp_digits, config.otp_interval)
            }
            _ => Ok(Self::fixed(config.rendezvous.clone())),
        }
    }

    pub fn is_rotating(&self) -> bool {
        matches!(self.source, Source::Rotating(_))
    }

    /// The current key.
    pub fn rendezvous(&self) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.rendezvous_at(now)
    }

    /// The key at `unix_secs`. Rotating keys are recorded as the latest.
    pub fn rendezvous_at(&self, unix_secs: u64) -> String {
        match &self.source {
            Source::Static(key) => key.clone(),
            Source::Rotating(totp) => {
                let key = fingerprint(&totp.at(unix_secs));
                *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(key.clone());
                key
            }
        }
    }

    /// The key handed out by the previous call, if any.
    pub fn previous(&self) -> Option<String> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
