//! Counter keys, backend outcomes and admission decisions.

use std::fmt;
use std::time::Duration;

use crate::domain::foundation::Timestamp;

use super::{LimitRule, Scope};

/// Key identifying one counter: `(scope, identifier, rule)`.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct CounterKey(String);

impl CounterKey {
    /// Builds the key, e.g. `ratelimit:client:1.2.3.4:100r60s`.
    pub fn new(prefix: &str, scope: &Scope, rule: &LimitRule) -> Self {
        let key = match scope.identifier() {
            Some(identifier) => format!(
                "{}:{}:{}:{}",
                prefix,
                scope.kind().key_tag(),
                identifier,
                rule.fingerprint()
            ),
            None => format!("{}:{}:{}", prefix, scope.kind().key_tag(), rule.fingerprint()),
        };
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a counter backend reports for one key.
#[derive(Debug, Clone, PartialEq)]
pub struct CounterOutcome {
    /// Whether the attempt was admitted (for a peek: whether it would be).
    pub allowed: bool,
    /// Entries inside the window after the operation.
    pub count: u32,
    /// Oldest entry still inside the window.
    pub oldest: Option<Timestamp>,
    /// Extra wait reported by burst control, independent of the window.
    pub retry_hint: Option<Duration>,
}

impl CounterOutcome {
    pub fn allowed(count: u32, oldest: Option<Timestamp>) -> Self {
        Self {
            allowed: true,
            count,
            oldest,
            retry_hint: None,
        }
    }

    pub fn rejected(count: u32, oldest: Option<Timestamp>) -> Self {
        Self {
            allowed: false,
            count,
            oldest,
            retry_hint: None,
        }
    }

    pub fn with_retry_hint(mut self, hint: Duration) -> Self {
        self.retry_hint = Some(hint);
        self
    }

    /// When the oldest entry leaves the window.
    pub fn reset_at(&self, rule: &LimitRule, now: Timestamp) -> Timestamp {
        self.oldest.unwrap_or(now).plus_millis(rule.window_millis())
    }
}

/// The admission decision for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: Timestamp,
    pub retry_after: Option<Duration>,
    pub violated_scope: Option<Scope>,
}

impl Decision {
    /// Decision for a request no quota applies to (or that failed open).
    pub fn unmetered(now: Timestamp) -> Self {
        Self {
            allowed: true,
            limit: 0,
            remaining: 0,
            reset_at: now,
            retry_after: None,
            violated_scope: None,
        }
    }

    /// Translates one backend outcome into a per-scope decision.
    pub fn from_outcome(scope: &Scope, rule: &LimitRule, outcome: &CounterOutcome, now: Timestamp) -> Self {
        let limit = rule.max_requests();
        let remaining = limit.saturating_sub(outcome.count);
        let reset_at = outcome.reset_at(rule, now);

        if outcome.allowed {
            return Self {
                allowed: true,
                limit,
                remaining,
                reset_at,
                retry_after: None,
                violated_scope: None,
            };
        }

        let window_wait = if outcome.count >= limit {
            now.until(&reset_at)
        } else {
            Duration::ZERO
        };
        let retry_after = window_wait.max(outcome.retry_hint.unwrap_or(Duration::ZERO));

        Self {
            allowed: false,
            limit,
            remaining,
            reset_at,
            retry_after: Some(retry_after),
            violated_scope: Some(scope.clone()),
        }
    }

    /// True when at least one quota was evaluated.
    pub fn is_metered(&self) -> bool {
        self.limit > 0
    }

    /// Keeps whichever decision leaves the caller less headroom.
    ///
    /// Lower `remaining` wins; ties go to the later `reset_at`. Unmetered
    /// decisions never win over metered ones.
    pub fn most_restrictive(self, other: Decision) -> Decision {
        if !self.is_metered() {
            return other;
        }
        if !other.is_metered() {
            return self;
        }
        match other.remaining.cmp(&self.remaining) {
            std::cmp::Ordering::Less => other,
            std::cmp::Ordering::Greater => self,
            std::cmp::Ordering::Equal if other.reset_at > self.reset_at => other,
            std::cmp::Ordering::Equal => self,
        }
    }
}

/// Read-only quota view for one scope, as served by the status endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeStatus {
    pub scope: Scope,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: Timestamp,
    pub window_seconds: u32,
}

impl ScopeStatus {
    pub fn from_outcome(scope: Scope, rule: &LimitRule, outcome: &CounterOutcome, now: Timestamp) -> Self {
        Self {
            limit: rule.max_requests(),
            remaining: rule.max_requests().saturating_sub(outcome.count),
            reset_at: outcome.reset_at(rule, now),
            window_seconds: rule.window_seconds(),
            scope,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::admission::ScopeKind;
    use crate::domain::foundation::UserId;

    fn rule(max: u32, window: u32) -> LimitRule {
        LimitRule::new(ScopeKind::PerClient, max, window).unwrap()
    }

    fn client() -> Scope {
        Scope::PerClient("1.2.3.4".to_string())
    }

    #[test]
    fn counter_key_includes_scope_identifier_and_rule() {
        let key = CounterKey::new("ratelimit", &client(), &rule(100, 60));
        assert_eq!(key.as_str(), "ratelimit:client:1.2.3.4:100r60s");

        let global = LimitRule::new(ScopeKind::Global, 1000, 60).unwrap();
        let key = CounterKey::new("ratelimit", &Scope::Global, &global);
        assert_eq!(key.as_str(), "ratelimit:global:1000r60s");

        let user = Scope::PerUser(UserId::new("u-9").unwrap());
        let key = CounterKey::new("kb", &user, &rule(200, 60));
        assert_eq!(key.to_string(), "kb:user:u-9:200r60s");
    }

    #[test]
    fn allowed_outcome_maps_remaining_and_reset() {
        let now = Timestamp::from_unix_secs(1_000);
        let outcome = CounterOutcome::allowed(2, Some(Timestamp::from_unix_secs(995)));
        let decision = Decision::from_outcome(&client(), &rule(5, 60), &outcome, now);

        assert!(decision.allowed);
        assert_eq!(decision.limit, 5);
        assert_eq!(decision.remaining, 3);
        assert_eq!(decision.reset_at.as_unix_secs(), 1_055);
        assert_eq!(decision.retry_after, None);
        assert_eq!(decision.violated_scope, None);
    }

    #[test]
    fn rejected_outcome_waits_for_oldest_entry() {
        let now = Timestamp::from_unix_secs(3);
        let outcome = CounterOutcome::rejected(3, Some(Timestamp::from_unix_secs(0)));
        let decision = Decision::from_outcome(&client(), &rule(3, 10), &outcome, now);

        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.retry_after, Some(Duration::from_secs(7)));
        assert_eq!(decision.violated_scope, Some(client()));
    }

    #[test]
    fn burst_rejection_uses_retry_hint() {
        let now = Timestamp::from_unix_secs(100);
        let outcome = CounterOutcome::rejected(1, Some(now)).with_retry_hint(Duration::from_millis(600));
        let decision = Decision::from_outcome(&client(), &rule(10, 60), &outcome, now);

        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 9);
        assert_eq!(decision.retry_after, Some(Duration::from_millis(600)));
    }

    #[test]
    fn most_restrictive_prefers_lowest_remaining() {
        let now = Timestamp::from_unix_secs(0);
        let loose = Decision::from_outcome(&Scope::Global, &rule(100, 60), &CounterOutcome::allowed(1, Some(now)), now);
        let tight = Decision::from_outcome(&client(), &rule(5, 60), &CounterOutcome::allowed(4, Some(now)), now);

        let chosen = loose.clone().most_restrictive(tight.clone());
        assert_eq!(chosen.remaining, 1);
        let chosen = tight.most_restrictive(loose);
        assert_eq!(chosen.remaining, 1);
    }

    #[test]
    fn most_restrictive_breaks_ties_on_later_reset() {
        let now = Timestamp::from_unix_secs(0);
        let early = Decision::from_outcome(&Scope::Global, &rule(5, 10), &CounterOutcome::allowed(3, Some(now)), now);
        let late = Decision::from_outcome(&client(), &rule(5, 60), &CounterOutcome::allowed(3, Some(now)), now);

        assert_eq!(early.most_restrictive(late).reset_at.as_unix_secs(), 60);
    }

    #[test]
    fn unmetered_never_wins() {
        let now = Timestamp::from_unix_secs(0);
        let metered = Decision::from_outcome(&client(), &rule(5, 60), &CounterOutcome::allowed(1, Some(now)), now);

        assert!(Decision::unmetered(now).most_restrictive(metered.clone()).is_metered());
        assert!(metered.most_restrictive(Decision::unmetered(now)).is_metered());
        assert!(!Decision::unmetered(now).is_metered());
    }

    #[test]
    fn scope_status_reports_headroom() {
        let now = Timestamp::from_unix_secs(50);
        let outcome = CounterOutcome::allowed(2, Some(Timestamp::from_unix_secs(45)));
        let status = ScopeStatus::from_outcome(client(), &rule(3, 10), &outcome, now);

        assert_eq!(status.remaining, 1);
        assert_eq!(status.reset_at.as_unix_secs(), 55);
        assert_eq!(status.window_seconds, 10);
    }
}
