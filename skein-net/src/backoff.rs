use std::time::Duration;

use rand::Rng;

/// Configuration for the discovery timer's exponential backoff.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first tick.
    pub initial: Duration,
    /// Ceiling the delay grows towards.
    pub max: Duration,
    /// Growth factor applied after every tick.
    pub multiplier: f64,
    /// Fraction of the delay randomly added or removed, in `[0, 1)`.
    pub jitter: f64,
}

impl BackoffConfig {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            ..Self::default()
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: skein_types::constants::DEFAULT_DISCOVERY_INTERVAL,
            max: skein_types::constants::DEFAULT_DISCOVERY_MAX_INTERVAL,
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

/// A ticker whose period grows geometrically up to a ceiling.
///
/// The period depends only on how many times the ticker fired, never on
/// what the caller did between ticks. Once at the ceiling it stays there.
pub struct BackoffTicker {
    config: BackoffConfig,
    current: Duration,
}

impl BackoffTicker {
    pub fn new(config: BackoffConfig) -> Self {
        let current = config.initial;
        Self { config, current }
    }

    /// The un-jittered delay before the next tick.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Return the next delay (with jitter) and advance the backoff.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.jittered(self.current);
        let grown = self.current.as_secs_f64() * self.config.multiplier;
        self.current = Duration::from_secs_f64(grown.min(self.config.max.as_secs_f64()));
        delay
    }

    /// Sleep until the next tick.
    pub async fn tick(&mut self) {
        let delay = self.next_delay();
        tokio::time::sleep(delay).await;
    }

    /// Start over from the initial delay.
    pub fn reset(&mut self) {
        self.current = self.config.initial;
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.config.jitter <= 0.0 || delay.is_zero() {
            return delay;
        }
        let spread = self.config.jitter.min(0.99);
        let factor = rand::thread_rng().gen_range(1.0 - spread..=1.0 + spread);
        Duration::from_secs_f64(delay.as_secs_f64() * factor)
    }
}
