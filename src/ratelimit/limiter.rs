//! Per-client admission control.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace};

use super::bucket::{BucketSettings, TokenBucket};
use super::client_key::ClientKey;
use crate::config::LimiterConfig;

/// Entries examined per lock acquisition during a sweep.
const SWEEP_BATCH: usize = 256;

/// Rate limiter state for one client.
#[derive(Debug)]
struct ClientEntry {
    key: ClientKey,
    bucket: TokenBucket,
    last_seen: Instant,
}

/// Client entries in a dense vector with a key index.
///
/// Lookup, insertion and removal are constant time, and a sweep can resume
/// from a position after the lock has been released.
#[derive(Debug, Default)]
struct ClientTable {
    index: HashMap<ClientKey, usize>,
    entries: Vec<ClientEntry>,
}

impl ClientTable {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn get_mut(&mut self, key: &ClientKey) -> Option<&mut ClientEntry> {
        let pos = *self.index.get(key)?;
        self.entries.get_mut(pos)
    }

    fn get_or_insert_with(
        &mut self,
        key: ClientKey,
        create: impl FnOnce() -> ClientEntry,
    ) -> &mut ClientEntry {
        let pos = match self.index.get(&key) {
            Some(&pos) => pos,
            None => {
                let pos = self.entries.len();
                self.entries.push(create());
                self.index.insert(key, pos);
                pos
            }
        };
        &mut self.entries[pos]
    }

    /// Remove the entry at `pos`; the last entry takes its place.
    fn swap_remove(&mut self, pos: usize) {
        let removed = self.entries.swap_remove(pos);
        self.index.remove(&removed.key);
        if let Some(moved) = self.entries.get(pos) {
            self.index.insert(moved.key, pos);
        }
    }
}

/// Per-client token bucket rate limiter.
///
/// Every client key owns an independent bucket, created full on the first
/// request. All bucket state lives in one table behind one mutex; the lock
/// is only ever held for a constant-time bucket update or a bounded sweep
/// batch, never across an await point.
pub struct ClientRateLimiter {
    /// `None` when limiting is disabled
    settings: Option<BucketSettings>,
    clients: Mutex<ClientTable>,
}

impl ClientRateLimiter {
    /// Create an enabled limiter with the given sustained rate and burst.
    pub fn new(rate: f64, burst: u32) -> Self {
        Self {
            settings: Some(BucketSettings::new(rate, burst)),
            clients: Mutex::new(ClientTable::default()),
        }
    }

    /// Create a limiter that admits every request.
    pub fn disabled() -> Self {
        Self {
            settings: None,
            clients: Mutex::new(ClientTable::default()),
        }
    }

    pub fn from_config(config: &LimiterConfig) -> Self {
        if config.enabled {
            Self::new(config.rps, config.burst)
        } else {
            Self::disabled()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.is_some()
    }

    /// Try to admit one request from `key`.
    ///
    /// Never blocks beyond the table lock and never suspends.
    pub fn admit(&self, key: &ClientKey) -> bool {
        self.admit_at(key, Instant::now())
    }

    /// [`admit`](Self::admit) with an explicit clock reading.
    pub fn admit_at(&self, key: &ClientKey, now: Instant) -> bool {
        let Some(settings) = self.settings else {
            return true;
        };

        let mut clients = self.clients.lock();
        let entry = clients.get_or_insert_with(*key, || {
            trace!(client = %key, "Creating client bucket");
            ClientEntry {
                key: *key,
                bucket: TokenBucket::new(settings, now),
                last_seen: now,
            }
        });

        entry.last_seen = now;
        let admitted = entry.bucket.try_acquire(now);
        drop(clients);

        if !admitted {
            debug!(client = %key, "Rate limit exceeded");
        }
        admitted
    }

    /// Remove clients idle for longer than `idle_threshold`.
    ///
    /// Returns the number of entries removed.
    pub async fn sweep(&self, idle_threshold: Duration) -> usize {
        self.sweep_at(Instant::now(), idle_threshold).await
    }

    /// [`sweep`](Self::sweep) with an explicit clock reading.
    ///
    /// At most [`SWEEP_BATCH`] entries are examined per lock acquisition;
    /// the lock is released and the task yields between batches. Every
    /// entry present when the sweep starts is examined once.
    pub async fn sweep_at(&self, now: Instant, idle_threshold: Duration) -> usize {
        let Some(cutoff) = now.checked_sub(idle_threshold) else {
            return 0;
        };

        let mut pos = 0;
        let mut removed = 0;
        loop {
            {
                let mut clients = self.clients.lock();
                let mut examined = 0;
                while pos < clients.len() && examined < SWEEP_BATCH {
                    examined += 1;
                    if clients.entries[pos].last_seen < cutoff {
                        // The tail entry moves into `pos` and is examined next
                        clients.swap_remove(pos);
                        removed += 1;
                    } else {
                        pos += 1;
                    }
                }
                if pos >= clients.len() {
                    break;
                }
            }
            tokio::task::yield_now().await;
        }

        removed
    }

    /// Spawn the periodic idle sweep.
    ///
    /// The task runs until the returned handle is aborted.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        idle_threshold: Duration,
    ) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        info!(
            interval_secs = interval.as_secs(),
            idle_threshold_secs = idle_threshold.as_secs(),
            "Starting rate limiter sweeper"
        );

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let removed = limiter.sweep(idle_threshold).await;
                if removed > 0 {
                    debug!(
                        removed = removed,
                        remaining = limiter.client_count(),
                        "Swept idle clients"
                    );
                }
            }
        })
    }

    /// Tokens currently available to `key`, if it has a bucket.
    pub fn available_tokens(&self, key: &ClientKey, now: Instant) -> Option<u32> {
        let mut clients = self.clients.lock();
        clients.get_mut(key).map(|entry| entry.bucket.available(now))
    }

    /// Get the number of tracked clients.
    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }
}

impl std::fmt::Debug for ClientRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRateLimiter")
            .field("settings", &self.settings)
            .field("clients", &self.client_count())
            .finish()
    }
}
