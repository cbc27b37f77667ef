//! Connection Rate Limiting
//!
//! Token bucket guarding one connection's inbound event stream. Drag
//! events are the volume driver (clients throttle them, but the server
//! does not trust that); the bucket bounds what a misbehaving client can
//! push into a room's broadcast fan-out.

use std::time::{Duration, Instant};

/// Token bucket limiter: capacity tokens, refilled continuously.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    max_tokens: u32,
    current_tokens: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Create a limiter holding at most `max_tokens`, fully refilled over
    /// `refill_interval`.
    pub fn new(max_tokens: u32, refill_interval: Duration) -> Self {
        Self {
            max_tokens,
            current_tokens: max_tokens as f64,
            refill_rate: max_tokens as f64 / refill_interval.as_secs_f64(),
            last_refill: Instant::now(),
        }
    }

    /// Consume one token if available.
    pub fn check_and_consume(&mut self) -> bool {
        self.refill();
        if self.current_tokens >= 1.0 {
            self.current_tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.current_tokens =
            (self.current_tokens + elapsed * self.refill_rate).min(self.max_tokens as f64);
        self.last_refill = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consumes_up_to_capacity() {
        let mut limiter = RateLimiter::new(5, Duration::from_secs(60));
        for _ in 0..5 {
            assert!(limiter.check_and_consume());
        }
        assert!(!limiter.check_and_consume());
    }

    #[test]
    fn test_refills_over_time() {
        let mut limiter = RateLimiter::new(10, Duration::from_millis(50));
        for _ in 0..10 {
            assert!(limiter.check_and_consume());
        }
        assert!(!limiter.check_and_consume());

        std::thread::sleep(Duration::from_millis(60));
        assert!(limiter.check_and_consume());
    }

    #[test]
    fn test_refill_caps_at_capacity() {
        let mut limiter = RateLimiter::new(2, Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(10));
        assert!(limiter.check_and_consume());
        assert!(limiter.check_and_consume());
        assert!(!limiter.check_and_consume());
    }
}
