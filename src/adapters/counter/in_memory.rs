//! In-memory counter backend for degraded mode and single-process setups.
//!
//! Sliding-window log per key, plus a token bucket for rules that carry a
//! burst allowance. Limits hold per process only; there is no cross-process
//! sharing.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::domain::admission::{CounterKey, CounterOutcome, LimitRule, SlidingLog, TokenBucket};
use crate::domain::foundation::Timestamp;
use crate::ports::{BackendError, CounterBackend};

/// Process-local counter backend.
///
/// Each key's read-modify-write runs while holding that key's map entry,
/// so concurrent checks on one key are serialized and cannot over-admit.
#[derive(Debug, Default)]
pub struct LocalCounter {
    /// Per-key window state.
    entries: DashMap<String, LocalEntry>,
}

/// State for a single key.
#[derive(Debug)]
struct LocalEntry {
    window: SlidingLog,
    window_ms: i64,
    bucket: Option<TokenBucket>,
}

impl LocalEntry {
    fn new(rule: &LimitRule, now: Timestamp) -> Self {
        Self {
            window: SlidingLog::new(),
            window_ms: rule.window_millis(),
            bucket: rule
                .burst_allowance()
                .map(|burst| TokenBucket::new(burst, rule.refill_rate(), now)),
        }
    }

    fn evaluate(&mut self, rule: &LimitRule, now: Timestamp) -> CounterOutcome {
        let max = rule.max_requests();
        let count = self.window.prune(now.as_unix_millis() - self.window_ms);
        if count >= max as usize {
            return self.window.peek(now, self.window_ms, max);
        }

        if let Some(bucket) = self.bucket.as_mut() {
            if let Err(wait) = bucket.try_consume(now) {
                let mut outcome = self.window.peek(now, self.window_ms, max);
                outcome.allowed = false;
                return outcome.with_retry_hint(wait);
            }
        }

        self.window.try_record(now, self.window_ms, max)
    }

    fn peek(&self, rule: &LimitRule, now: Timestamp) -> CounterOutcome {
        let outcome = self.window.peek(now, self.window_ms, rule.max_requests());
        match &self.bucket {
            Some(bucket) if outcome.allowed && bucket.available_at(now) < 1.0 => CounterOutcome {
                allowed: false,
                ..outcome
            },
            _ => outcome,
        }
    }

    fn is_idle(&self, now: Timestamp) -> bool {
        self.window.is_idle(now, self.window_ms)
            && self.bucket.as_ref().map_or(true, |bucket| bucket.is_full_at(now))
    }
}

impl LocalCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops keys whose windows are empty and whose buckets are full.
    ///
    /// Returns how many keys were removed.
    pub fn prune_idle(&self, now: Timestamp) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_idle(now));
        before.saturating_sub(self.entries.len())
    }

    /// Synchronous core of [`CounterBackend::evaluate_and_record`].
    pub fn evaluate(&self, key: &CounterKey, rule: &LimitRule, now: Timestamp) -> CounterOutcome {
        let mut entry = self
            .entries
            .entry(key.as_str().to_string())
            .or_insert_with(|| LocalEntry::new(rule, now));
        entry.evaluate(rule, now)
    }

    /// Synchronous core of [`CounterBackend::peek`].
    pub fn inspect(&self, key: &CounterKey, rule: &LimitRule, now: Timestamp) -> CounterOutcome {
        match self.entries.get(key.as_str()) {
            Some(entry) => entry.peek(rule, now),
            None => CounterOutcome {
                allowed: true,
                count: 0,
                oldest: None,
                retry_hint: None,
            },
        }
    }
}

#[async_trait]
impl CounterBackend for LocalCounter {
    async fn evaluate_and_record(
        &self,
        key: &CounterKey,
        rule: &LimitRule,
        now: Timestamp,
    ) -> Result<CounterOutcome, BackendError> {
        Ok(self.evaluate(key, rule, now))
    }

    async fn peek(
        &self,
        key: &CounterKey,
        rule: &LimitRule,
        now: Timestamp,
    ) -> Result<CounterOutcome, BackendError> {
        Ok(self.inspect(key, rule, now))
    }

    async fn health_check(&self) -> Result<(), BackendError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::admission::{Scope, ScopeKind};
    use std::sync::Arc;
    use std::time::Duration;

    fn rule(max: u32, window: u32) -> LimitRule {
        LimitRule::new(ScopeKind::PerClient, max, window).unwrap()
    }

    fn key_for(ip: &str, rule: &LimitRule) -> CounterKey {
        CounterKey::new("ratelimit", &Scope::PerClient(ip.to_string()), rule)
    }

    fn at(secs: u64) -> Timestamp {
        Timestamp::from_unix_secs(secs)
    }

    // ─── Basic Functionality Tests ───────────────────────────────────

    #[tokio::test]
    async fn remaining_decrements_then_rejects() {
        let counter = LocalCounter::new();
        let rule = rule(5, 60);
        let key = key_for("192.168.1.1", &rule);

        for expected_count in 1..=5 {
            let outcome = counter.evaluate_and_record(&key, &rule, at(0)).await.unwrap();
            assert!(outcome.allowed);
            assert_eq!(outcome.count, expected_count);
        }

        let outcome = counter.evaluate_and_record(&key, &rule, at(1)).await.unwrap();
        assert!(!outcome.allowed);
        assert_eq!(outcome.oldest, Some(at(0)));
    }

    #[tokio::test]
    async fn window_expiry_readmits_key() {
        let counter = LocalCounter::new();
        let rule = rule(2, 10);
        let key = key_for("10.0.0.2", &rule);

        counter.evaluate(&key, &rule, at(0));
        counter.evaluate(&key, &rule, at(1));
        assert!(!counter.evaluate(&key, &rule, at(5)).allowed);
        assert!(counter.evaluate(&key, &rule, at(11)).allowed);
    }

    #[tokio::test]
    async fn peek_never_consumes() {
        let counter = LocalCounter::new();
        let rule = rule(3, 60);
        let key = key_for("10.0.0.1", &rule);

        counter.evaluate(&key, &rule, at(0));
        for _ in 0..10 {
            let outcome = counter.peek(&key, &rule, at(1)).await.unwrap();
            assert_eq!(outcome.count, 1);
            assert!(outcome.allowed);
        }
        assert_eq!(counter.evaluate(&key, &rule, at(2)).count, 2);
    }

    #[tokio::test]
    async fn peek_of_unknown_key_reports_empty_window() {
        let counter = LocalCounter::new();
        let rule = rule(3, 60);
        let outcome = counter.peek(&key_for("9.9.9.9", &rule), &rule, at(0)).await.unwrap();
        assert!(outcome.allowed);
        assert_eq!(outcome.count, 0);
        assert!(counter.is_empty());
    }

    // ─── Different Keys Are Independent ───────────────────────────────

    #[tokio::test]
    async fn different_keys_have_independent_limits() {
        let counter = LocalCounter::new();
        let rule = rule(1, 60);
        let key1 = key_for("1.1.1.1", &rule);
        let key2 = key_for("2.2.2.2", &rule);

        assert!(counter.evaluate(&key1, &rule, at(0)).allowed);
        assert!(!counter.evaluate(&key1, &rule, at(0)).allowed);
        assert!(counter.evaluate(&key2, &rule, at(0)).allowed);
    }

    // ─── Burst Control ────────────────────────────────────────────────

    #[tokio::test]
    async fn burst_allowance_throttles_within_window() {
        let counter = LocalCounter::new();
        let rule = rule(60, 60).with_burst(2).unwrap();
        let key = key_for("3.3.3.3", &rule);

        assert!(counter.evaluate(&key, &rule, at(0)).allowed);
        assert!(counter.evaluate(&key, &rule, at(0)).allowed);

        let throttled = counter.evaluate(&key, &rule, at(0));
        assert!(!throttled.allowed);
        assert_eq!(throttled.count, 2);
        assert_eq!(throttled.retry_hint, Some(Duration::from_secs(1)));

        // One token per second refills at 60 req / 60 s.
        assert!(counter.evaluate(&key, &rule, at(1)).allowed);
    }

    #[tokio::test]
    async fn burst_rejection_does_not_record() {
        let counter = LocalCounter::new();
        let rule = rule(10, 10).with_burst(1).unwrap();
        let key = key_for("4.4.4.4", &rule);

        counter.evaluate(&key, &rule, at(0));
        for _ in 0..5 {
            assert!(!counter.evaluate(&key, &rule, at(0)).allowed);
        }
        assert_eq!(counter.inspect(&key, &rule, at(0)).count, 1);
    }

    // ─── Housekeeping ─────────────────────────────────────────────────

    #[tokio::test]
    async fn prune_idle_drops_expired_keys_only() {
        let counter = LocalCounter::new();
        let short = rule(5, 1);
        let long = LimitRule::new(ScopeKind::Global, 5, 3600).unwrap();

        counter.evaluate(&key_for("5.5.5.5", &short), &short, at(0));
        counter.evaluate(&CounterKey::new("ratelimit", &Scope::Global, &long), &long, at(0));
        assert_eq!(counter.len(), 2);

        assert_eq!(counter.prune_idle(at(10)), 1);
        assert_eq!(counter.len(), 1);

        assert_eq!(counter.prune_idle(at(3_700)), 1);
        assert!(counter.is_empty());
    }

    // ─── Concurrency ──────────────────────────────────────────────────

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_checks_never_over_admit() {
        let counter = Arc::new(LocalCounter::new());
        let rule = Arc::new(rule(25, 60));
        let key = Arc::new(key_for("6.6.6.6", &rule));
        let now = at(0);

        let handles: Vec<_> = (0..200)
            .map(|_| {
                let counter = counter.clone();
                let rule = rule.clone();
                let key = key.clone();
                tokio::spawn(async move { counter.evaluate(&key, &rule, now).allowed })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 25);
    }
}
