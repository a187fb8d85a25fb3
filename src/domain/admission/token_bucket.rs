//! Lazily refilled token bucket for process-local burst control.

use std::time::Duration;

use crate::domain::foundation::Timestamp;

#[derive(Debug, Clone, PartialEq)]
pub struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_rate: f64,
    last_refill: Timestamp,
}

impl TokenBucket {
    /// Creates a full bucket. `refill_rate` is tokens per second.
    pub fn new(capacity: u32, refill_rate: f64, now: Timestamp) -> Self {
        Self {
            tokens: f64::from(capacity),
            capacity: f64::from(capacity),
            refill_rate,
            last_refill: now,
        }
    }

    /// Refills, then takes one token if available.
    ///
    /// `last_refill` moves to `now` whether or not a token is taken. On
    /// rejection the error carries the time until the next whole token.
    pub fn try_consume(&mut self, now: Timestamp) -> Result<(), Duration> {
        self.tokens = self.available_at(now);
        if now > self.last_refill {
            self.last_refill = now;
        }

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            Err(self.time_to_next_token())
        }
    }

    /// Tokens that would be available at `now`, without touching state.
    pub fn available_at(&self, now: Timestamp) -> f64 {
        let elapsed_ms = now.duration_since(&self.last_refill).num_milliseconds().max(0);
        let refilled = self.tokens + (elapsed_ms as f64 / 1000.0) * self.refill_rate;
        refilled.min(self.capacity)
    }

    pub fn is_full_at(&self, now: Timestamp) -> bool {
        self.available_at(now) >= self.capacity
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    fn time_to_next_token(&self) -> Duration {
        if self.refill_rate <= 0.0 {
            return Duration::MAX;
        }
        Duration::from_secs_f64(((1.0 - self.tokens) / self.refill_rate).max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn at_ms(ms: i64) -> Timestamp {
        Timestamp::from_unix_millis(ms)
    }

    #[test]
    fn full_bucket_allows_burst_up_to_capacity() {
        let mut bucket = TokenBucket::new(3, 1.0, at_ms(0));
        assert!(bucket.try_consume(at_ms(0)).is_ok());
        assert!(bucket.try_consume(at_ms(0)).is_ok());
        assert!(bucket.try_consume(at_ms(0)).is_ok());

        let wait = bucket.try_consume(at_ms(0)).unwrap_err();
        assert_eq!(wait, Duration::from_secs(1));
    }

    #[test]
    fn refills_lazily_with_elapsed_time() {
        let mut bucket = TokenBucket::new(2, 2.0, at_ms(0));
        bucket.try_consume(at_ms(0)).unwrap();
        bucket.try_consume(at_ms(0)).unwrap();
        assert!(bucket.try_consume(at_ms(100)).is_err());

        // 100ms at 2 tokens/s already refilled 0.2; 400ms more completes a token.
        assert!(bucket.try_consume(at_ms(500)).is_ok());
    }

    #[test]
    fn rejected_check_still_advances_last_refill() {
        let mut bucket = TokenBucket::new(1, 1.0, at_ms(0));
        bucket.try_consume(at_ms(0)).unwrap();
        assert!(bucket.try_consume(at_ms(500)).is_err());
        assert!((bucket.tokens() - 0.5).abs() < 1e-9);
        assert_eq!(bucket.last_refill, at_ms(500));
    }

    #[test]
    fn refill_never_exceeds_capacity() {
        let bucket = TokenBucket::new(5, 10.0, at_ms(0));
        assert!((bucket.available_at(at_ms(60_000)) - 5.0).abs() < f64::EPSILON);
        assert!(bucket.is_full_at(at_ms(1)));
    }

    proptest! {
        #[test]
        fn tokens_stay_within_bounds(
            capacity in 1u32..50,
            rate in 0.1f64..20.0,
            steps in proptest::collection::vec(0i64..2_000, 1..100),
        ) {
            let mut bucket = TokenBucket::new(capacity, rate, at_ms(0));
            let mut now = 0i64;
            for step in steps {
                now += step;
                let _ = bucket.try_consume(at_ms(now));
                prop_assert!(bucket.tokens() >= 0.0);
                prop_assert!(bucket.tokens() <= bucket.capacity());
            }
        }
    }
}
