use std::time::Duration;

/// Capped exponential backoff used between failed feed fetches.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Fraction of the computed delay added as random jitter.
    pub jitter_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(300),
            multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

pub fn calculate_delay(attempt: u32, config: &BackoffConfig) -> Duration {
    let base_ms = config.base_delay.as_millis() as f64;
    let max_ms = config.max_delay.as_millis() as u64;

    let exponential_ms = if attempt == 0 {
        base_ms as u64
    } else {
        let multiplier = config.multiplier.powi(attempt.min(32) as i32);
        ((base_ms * multiplier) as u64).min(max_ms)
    };

    let jitter_range = (exponential_ms as f64 * config.jitter_factor) as u64;
    let jitter = fastrand::u64(0..=jitter_range);

    Duration::from_millis((exponential_ms + jitter).min(max_ms))
}

/// Tracks consecutive failures; the delay grows until `reset` is called.
#[derive(Debug)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = calculate_delay(self.attempt, &self.config);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}
