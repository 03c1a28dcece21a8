//! Minimum-interval pacing for outbound requests.
//!
//! The public CWE service asks clients to keep their request rate low. A
//! [`RateLimiter`] guarantees that successive releases are at least
//! `interval` apart. Callers queue on an async mutex, so concurrent requests
//! are released one at a time in the order they started waiting.
//!
//! An interval of zero disables pacing entirely (useful in tests).

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// RateLimiter
// ---------------------------------------------------------------------------

/// Serialises callers and spaces their releases by a fixed interval.
///
/// Thread-safe; share it between transports via `Arc`.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    /// `None` until the first release, and again after [`RateLimiter::reset`].
    last_release: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a limiter that releases at most once per `interval`.
    ///
    /// Pass [`Duration::ZERO`] to disable pacing.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_release: Mutex::new(None),
        }
    }

    /// Create a limiter from a request rate. A rate `<= 0` disables pacing.
    pub fn per_second(rps: f64) -> Self {
        Self::new(crate::config::interval_for_rate(rps))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until the caller may send its request.
    ///
    /// The first call after construction or [`reset`](Self::reset) returns
    /// immediately. The lock is held while sleeping, which is what serialises
    /// concurrent callers.
    pub async fn wait(&self) {
        if self.interval.is_zero() {
            return;
        }
        let mut last = self.last_release.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.interval {
                tokio::time::sleep(self.interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Forget the last release so the next [`wait`](Self::wait) returns at once.
    pub async fn reset(&self) {
        *self.last_release.lock().await = None;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
