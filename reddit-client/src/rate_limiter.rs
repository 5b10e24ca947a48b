use parking_lot::Mutex;
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::debug;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    refilled_at: Instant,
}

/// Token bucket for the authenticated API. Refills continuously at
/// `per_minute / 60` tokens a second up to `burst`.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Mutex<Bucket>,
    burst: f64,
    per_second: f64,
    per_minute: u32,
}

impl RateLimiter {
    pub fn new(per_minute: u32, burst: u32) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            bucket: Mutex::new(Bucket {
                tokens: burst,
                refilled_at: Instant::now(),
            }),
            burst,
            per_second: f64::from(per_minute.max(1)) / 60.0,
            per_minute,
        }
    }

    /// Reddit's OAuth allowance: 100 requests a minute.
    pub fn reddit_oauth() -> Self {
        Self::new(100, 10)
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let earned = now.duration_since(bucket.refilled_at).as_secs_f64() * self.per_second;
        bucket.tokens = (bucket.tokens + earned).min(self.burst);
        bucket.refilled_at = now;
    }

    /// Takes one token, or says how long until one is available.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            Err(Duration::from_secs_f64(
                (1.0 - bucket.tokens) / self.per_second,
            ))
        }
    }

    /// Waits for a token and returns how long that took.
    pub async fn acquire(&self) -> Duration {
        let started = Instant::now();
        while let Err(wait) = self.try_acquire() {
            debug!("API rate limit reached, waiting {:?}", wait);
            sleep(wait).await;
        }
        started.elapsed()
    }

    pub fn status(&self) -> RateLimitStatus {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket);
        RateLimitStatus {
            available_tokens: bucket.tokens.floor() as u32,
            burst: self.burst as u32,
            requests_per_minute: self.per_minute,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RateLimitStatus {
    pub available_tokens: u32,
    pub burst: u32,
    pub requests_per_minute: u32,
}

/// Courtesy spacing for the unauthenticated JSON endpoints.
///
/// The last-request timestamp is read and written without holding the lock
/// across the sleep, so concurrent callers can undercut the spacing. The
/// fan-out tolerates that.
#[derive(Debug)]
pub struct RequestPacer {
    min_delay: Duration,
    max_jitter: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RequestPacer {
    pub fn new(min_delay: Duration, max_jitter: Duration) -> Self {
        Self {
            min_delay,
            max_jitter,
            last_request: Mutex::new(None),
        }
    }

    /// `min_delay` plus up to one second of jitter.
    pub fn reddit_public(min_delay: Duration) -> Self {
        Self::new(min_delay, Duration::from_secs(1))
    }

    /// How long a caller arriving now would sleep, without the jitter.
    pub fn pending_delay(&self) -> Duration {
        let last = *self.last_request.lock();
        match last {
            Some(last) => self.min_delay.saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        }
    }

    pub async fn wait(&self) {
        let delay = self.pending_delay();
        if !delay.is_zero() {
            let jitter = self.max_jitter.mul_f64(fastrand::f64());
            debug!("Pacing public request for {:?}", delay + jitter);
            sleep(delay + jitter).await;
        }
        *self.last_request.lock() = Some(Instant::now());
    }
}
