//! Shared rate-limit bookkeeping for the frequency provider
//!
//! One instance is shared by every worker (and every concurrent parse run)
//! talking to the same provider. It combines:
//! - a global minimum interval between requests (`governor` direct limiter)
//! - a cooldown deadline that any worker trips on a rate-limit response and
//!   that every worker waits out before its next request

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::infrastructure::config::FrequencyConfig;

/// Returned when the wait for a request slot was cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("throttle wait cancelled")]
pub struct ThrottleCancelled;

pub struct ProviderThrottle {
    limiter: Option<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    cooldown_until: Mutex<Option<Instant>>,
    default_cooldown: Duration,
    trips: AtomicU64,
}

impl ProviderThrottle {
    pub fn new(min_interval: Duration, default_cooldown: Duration) -> Self {
        let limiter = Quota::with_period(min_interval)
            .map(|quota| RateLimiter::direct(quota.allow_burst(NonZeroU32::MIN)));

        Self {
            limiter,
            cooldown_until: Mutex::new(None),
            default_cooldown,
            trips: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &FrequencyConfig) -> Self {
        Self::new(
            Duration::from_millis(config.min_request_interval_ms),
            Duration::from_millis(config.rate_limit_cooldown_ms),
        )
    }

    /// No spacing and no default cooldown
    pub fn unthrottled() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Record a rate-limit response. The cooldown only ever extends, so two
    /// workers tripping at once keep the later deadline. Returns the cooldown applied.
    pub fn trip(&self, retry_after: Option<Duration>) -> Duration {
        let cooldown = retry_after.unwrap_or(self.default_cooldown);
        let deadline = Instant::now() + cooldown;

        let mut guard = self
            .cooldown_until
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = Some(match *guard {
            Some(existing) if existing > deadline => existing,
            _ => deadline,
        });
        drop(guard);

        self.trips.fetch_add(1, Ordering::Relaxed);
        info!("⏸️ Provider rate limit hit, cooling down for {:?}", cooldown);
        cooldown
    }

    /// Remaining cooldown, if one is active
    pub fn cooldown_remaining(&self) -> Option<Duration> {
        let guard = self
            .cooldown_until
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        guard.and_then(|deadline| {
            let now = Instant::now();
            (deadline > now).then(|| deadline - now)
        })
    }

    /// Number of rate-limit responses seen so far
    pub fn trip_count(&self) -> u64 {
        self.trips.load(Ordering::Relaxed)
    }

    /// Wait until a request may be sent: outstanding cooldown first, then the
    /// minimum interval slot.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), ThrottleCancelled> {
        loop {
            while let Some(remaining) = self.cooldown_remaining() {
                debug!("Waiting out provider cooldown: {:?}", remaining);
                tokio::select! {
                    () = tokio::time::sleep(remaining) => {}
                    () = cancel.cancelled() => return Err(ThrottleCancelled),
                }
            }

            if let Some(limiter) = &self.limiter {
                tokio::select! {
                    () = limiter.until_ready() => {}
                    () = cancel.cancelled() => return Err(ThrottleCancelled),
                }
            } else if cancel.is_cancelled() {
                return Err(ThrottleCancelled);
            }

            // Another worker may have tripped the cooldown while we waited for a slot
            if self.cooldown_remaining().is_none() {
                return Ok(());
            }
        }
    }
}

impl std::fmt::Debug for ProviderThrottle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderThrottle")
            .field("spaced", &self.limiter.is_some())
            .field("default_cooldown", &self.default_cooldown)
            .field("trips", &self.trip_count())
            .finish_non_exhaustive()
    }
}
