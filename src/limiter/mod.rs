//! Per-client admission control.
//!
//! Every client identity (normally the caller's IP address) owns one token
//! bucket. Buckets are created on first sight and evicted by a background
//! sweeper once they have been idle longer than the configured threshold.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use governor::clock::Clock;
use governor::middleware::NoOpMiddleware;
use governor::nanos::Nanos;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as Governor};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::LimiterConfig;

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Denied,
}

#[derive(Debug, thiserror::Error)]
pub enum LimiterError {
    #[error("requests per second must be a positive finite number, got {0}")]
    InvalidRate(f64),
}

/// Time source shared by every bucket of one [`RateLimiter`]. It reports the
/// instant of the admission in progress, so token refill follows the same
/// `now` that callers pass to [`RateLimiter::admit`].
#[derive(Debug, Clone)]
struct AdmissionClock {
    epoch: Instant,
    current: Arc<AtomicU64>,
}

impl AdmissionClock {
    fn new(epoch: Instant) -> Self {
        Self {
            epoch,
            current: Arc::new(AtomicU64::new(0)),
        }
    }

    fn set(&self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.epoch).as_nanos();
        self.current
            .store(u64::try_from(elapsed).unwrap_or(u64::MAX), Ordering::Release);
    }
}

impl Clock for AdmissionClock {
    type Instant = Nanos;

    fn now(&self) -> Nanos {
        Nanos::from(self.current.load(Ordering::Acquire))
    }
}

type Bucket = Governor<NotKeyed, InMemoryState, AdmissionClock, NoOpMiddleware<Nanos>>;

struct ClientBucket {
    limiter: Bucket,
    last_seen: Instant,
}

pub struct RateLimiter {
    // `None` when limiting is switched off.
    quota: Option<Quota>,
    stale_after: Duration,
    sweep_interval: Duration,
    clock: AdmissionClock,
    clients: Mutex<HashMap<String, ClientBucket>>,
}

impl RateLimiter {
    pub fn new(config: &LimiterConfig) -> Result<Self, LimiterError> {
        let quota = if config.enabled {
            Some(quota_for(config.rps, config.burst).ok_or(LimiterError::InvalidRate(config.rps))?)
        } else {
            None
        };

        Ok(Self {
            quota,
            stale_after: config.stale_after(),
            sweep_interval: config.sweep_interval(),
            clock: AdmissionClock::new(Instant::now()),
            clients: Mutex::new(HashMap::new()),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.quota.is_some()
    }

    /// Takes one token from the bucket of `identity`, creating the bucket if
    /// this identity has not been seen since its last eviction. Never waits.
    pub fn admit(&self, identity: &str, now: Instant) -> Admission {
        let Some(quota) = self.quota else {
            return Admission::Allowed;
        };

        let mut clients = self.clients();
        // Admissions are serialized by the map lock, so the shared clock
        // holds this call's instant until `check` returns.
        self.clock.set(now);
        let bucket = clients
            .entry(identity.to_owned())
            .or_insert_with(|| ClientBucket {
                limiter: Governor::direct_with_clock(quota, self.clock.clone()),
                last_seen: now,
            });
        bucket.last_seen = now;

        match bucket.limiter.check() {
            Ok(()) => Admission::Allowed,
            Err(_) => Admission::Denied,
        }
    }

    /// Drops every bucket idle for longer than the staleness threshold and
    /// returns how many were removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut clients = self.clients();
        let before = clients.len();
        clients.retain(|_, bucket| now.saturating_duration_since(bucket.last_seen) <= self.stale_after);
        before - clients.len()
    }

    pub fn tracked_clients(&self) -> usize {
        self.clients().len()
    }

    /// Starts the periodic sweep. The task runs until `shutdown` is cancelled.
    pub fn spawn_sweeper(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let period = limiter.sweep_interval;
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = limiter.sweep(Instant::now());
                        if removed > 0 {
                            tracing::debug!(
                                removed,
                                remaining = limiter.tracked_clients(),
                                "Evicted idle rate limit buckets"
                            );
                        }
                    }
                }
            }

            tracing::debug!("Rate limit sweeper stopped");
        })
    }

    // The map is left consistent by every critical section, so a poisoned
    // lock is still safe to use.
    fn clients(&self) -> MutexGuard<'_, HashMap<String, ClientBucket>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn quota_for(rps: f64, burst: u32) -> Option<Quota> {
    if !(rps.is_finite() && rps > 0.0) {
        return None;
    }
    let period = Duration::try_from_secs_f64(1.0 / rps).ok()?;
    let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
    Quota::with_period(period).map(|quota| quota.allow_burst(burst))
}
