//! Token bucket implementation.

use std::time::Duration;
use tokio::time::Instant;

/// Shape shared by every client's bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketSettings {
    /// Maximum number of tokens a bucket holds (the burst size)
    capacity: u32,
    /// Time to earn one token back
    interval: Duration,
}

impl BucketSettings {
    /// Build settings from a sustained rate (tokens per second) and burst size.
    ///
    /// The refill interval is rounded up to the next nanosecond so a bucket
    /// never earns tokens faster than `rate`.
    pub fn new(rate: f64, burst: u32) -> Self {
        let nanos = (1_000_000_000f64 / rate).ceil();
        let nanos = if nanos.is_finite() && nanos >= 1.0 {
            nanos.min(u64::MAX as f64) as u64
        } else {
            1
        };

        Self {
            capacity: burst.max(1),
            interval: Duration::from_nanos(nanos),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// A single client's token bucket.
///
/// Tokens are whole numbers. Partial refill progress is carried in
/// `last_refill`, which only advances by whole intervals until the bucket
/// is full again.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    settings: BucketSettings,
    /// Tokens currently available
    tokens: u32,
    /// Point up to which refill has been credited
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket.
    pub fn new(settings: BucketSettings, now: Instant) -> Self {
        Self {
            settings,
            tokens: settings.capacity,
            last_refill: now,
        }
    }

    /// Refill for the time elapsed up to `now` and try to take one token.
    ///
    /// Returns `true` if a token was consumed.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        self.refill(now);

        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }

    /// Tokens available at `now`, without consuming any.
    pub fn available(&mut self, now: Instant) -> u32 {
        self.refill(now);
        self.tokens
    }

    pub fn capacity(&self) -> u32 {
        self.settings.capacity
    }

    fn refill(&mut self, now: Instant) {
        if self.tokens >= self.settings.capacity {
            self.last_refill = now.max(self.last_refill);
            return;
        }

        let elapsed = now.saturating_duration_since(self.last_refill);
        let interval = self.settings.interval.as_nanos();
        let earned = elapsed.as_nanos() / interval;
        if earned == 0 {
            return;
        }

        let missing = u128::from(self.settings.capacity - self.tokens);
        if earned >= missing {
            self.tokens = self.settings.capacity;
            self.last_refill = now;
        } else {
            // earned < missing <= u32::MAX
            self.tokens += earned as u32;
            self.last_refill += self.settings.interval * earned as u32;
        }
    }
}
