use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};
use tracing::trace;

/// Enforces a minimum spacing between consecutive dispatches.
///
/// Callers queue on a FIFO-fair mutex which is held while sleeping until the
/// next slot, so concurrent callers are released one interval apart and in
/// arrival order.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_dispatch: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// A non-positive or non-finite rate disables limiting.
    pub fn new(requests_per_second: f64) -> Self {
        let min_interval = if requests_per_second.is_finite() && requests_per_second > 0.0 {
            Duration::from_secs_f64(1.0 / requests_per_second)
        } else {
            Duration::ZERO
        };

        Self {
            min_interval,
            last_dispatch: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait for the next dispatch slot and claim it.
    pub async fn acquire(&self) -> Instant {
        let mut last = self.last_dispatch.lock().await;

        if let Some(previous) = *last {
            let next_slot = previous + self.min_interval;
            if next_slot > Instant::now() {
                trace!(
                    wait_ms = (next_slot - Instant::now()).as_millis() as u64,
                    "rate limited"
                );
                sleep_until(next_slot).await;
            }
        }

        let now = Instant::now();
        *last = Some(now);
        now
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn sequential_acquires_are_spaced() {
        let limiter = RateLimiter::new(500.0);
        let mut stamps = Vec::new();
        for _ in 0..20 {
            stamps.push(limiter.acquire().await);
        }

        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= limiter.min_interval());
        }
    }

    #[tokio::test]
    async fn concurrent_callers_never_share_a_slot() {
        let limiter = Arc::new(RateLimiter::new(200.0));
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.acquire().await })
            })
            .collect();

        let mut stamps = Vec::new();
        for handle in handles {
            stamps.push(handle.await.unwrap());
        }
        stamps.sort();

        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= limiter.min_interval());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn many_concurrent_callers_on_paused_clock() {
        let limiter = Arc::new(RateLimiter::new(10.0));
        let start = Instant::now();
        let handles: Vec<_> = (0..120)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.acquire().await })
            })
            .collect();

        let mut stamps = Vec::with_capacity(handles.len());
        for handle in handles {
            stamps.push(handle.await.unwrap());
        }
        stamps.sort();

        let interval = limiter.min_interval();
        assert_eq!(interval, Duration::from_millis(100));
        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= interval);
        }
        assert!(stamps[119] - start >= interval * 119);
    }

    #[test]
    fn invalid_rate_disables_limiting() {
        assert_eq!(RateLimiter::new(0.0).min_interval(), Duration::ZERO);
        assert_eq!(RateLimiter::new(f64::NAN).min_interval(), Duration::ZERO);
        assert_eq!(
            RateLimiter::new(10.0).min_interval(),
            Duration::from_millis(100)
        );
    }
}
