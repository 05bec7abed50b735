use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

pub const DEFAULT_REQUESTS_PER_SECOND: usize = 3;

/// Time source for rate limiting and retry backoff.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Virtual clock: `sleep` advances time instantly and records the request.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
    sleeps: Mutex<Vec<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
            sleeps: Mutex::new(Vec::new()),
        }
    }
}

impl ManualClock {
    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += duration;
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(duration);
        self.advance(duration);
    }
}

/// Sliding-window limiter: no window of `window` length holds more than
/// `max_requests` releases.
///
/// Release slots are reserved under the lock in call order; the wait itself
/// happens outside it.
pub struct RateLimiter<C: Clock = SystemClock> {
    clock: C,
    max_requests: usize,
    window: Duration,
    releases: Mutex<VecDeque<Instant>>,
}

impl RateLimiter<SystemClock> {
    pub fn per_second(max_requests: usize) -> Self {
        Self::with_clock(max_requests, Duration::from_secs(1), SystemClock)
    }
}

impl<C: Clock> RateLimiter<C> {
    pub fn with_clock(max_requests: usize, window: Duration, clock: C) -> Self {
        let max_requests = max_requests.max(1);
        Self {
            clock,
            max_requests,
            window,
            releases: Mutex::new(VecDeque::with_capacity(max_requests)),
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// Blocks until the next request may go out; returns the release instant.
    pub fn acquire(&self) -> Instant {
        let release_at = {
            let mut releases = self
                .releases
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let now = self.clock.now();
            let release_at = if releases.len() < self.max_requests {
                now
            } else {
                let oldest = releases[releases.len() - self.max_requests];
                (oldest + self.window).max(now)
            };
            releases.push_back(release_at);
            while releases.len() > self.max_requests {
                releases.pop_front();
            }
            release_at
        };

        let now = self.clock.now();
        if release_at > now {
            self.clock.sleep(release_at - now);
        }
        release_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_burst_is_not_delayed() {
        let clock = Arc::new(ManualClock::default());
        let limiter = RateLimiter::with_clock(3, Duration::from_secs(1), clock.clone());
        for _ in 0..3 {
            limiter.acquire();
        }
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn fourth_request_waits_for_window() {
        let clock = Arc::new(ManualClock::default());
        let limiter = RateLimiter::with_clock(3, Duration::from_secs(1), clock.clone());
        let start = clock.now();
        for _ in 0..4 {
            limiter.acquire();
        }
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(1)]);
        assert_eq!(clock.now() - start, Duration::from_secs(1));
    }

    #[test]
    fn idle_time_refills_the_window() {
        let clock = Arc::new(ManualClock::default());
        let limiter = RateLimiter::with_clock(2, Duration::from_secs(1), clock.clone());
        limiter.acquire();
        limiter.acquire();
        clock.advance(Duration::from_millis(1500));
        limiter.acquire();
        limiter.acquire();
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn zero_cap_is_clamped_to_one() {
        let limiter = RateLimiter::with_clock(0, Duration::from_secs(1), ManualClock::default());
        assert_eq!(limiter.max_requests(), 1);
    }
}
