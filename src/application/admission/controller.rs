//! AdmissionController - decides whether a request may proceed.
//!
//! Scopes are checked in a fixed order (global, per-client, per-endpoint,
//! per-user). The first exhausted quota rejects the request; earlier scopes
//! keep the attempt they already recorded. When every scope passes, the
//! decision reports the scope with the least headroom.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, error};

use crate::domain::admission::{
    CounterKey, Decision, LimitRule, RuleRegistry, Scope, ScopeKind, ScopeStatus,
};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::CounterBackend;

/// Client identifier used when no address can be determined.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Everything the controller needs to know about one request.
#[derive(Debug, Clone)]
pub struct AdmissionRequest {
    pub client_ip: String,
    pub path: String,
    pub user_id: Option<UserId>,
    pub now: Timestamp,
}

impl AdmissionRequest {
    /// Builds a request; a missing client address becomes `"unknown"`.
    pub fn new(client_ip: Option<String>, path: impl Into<String>, now: Timestamp) -> Self {
        Self {
            client_ip: client_ip
                .filter(|ip| !ip.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN_CLIENT.to_string()),
            path: path.into(),
            user_id: None,
            now,
        }
    }

    pub fn with_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }
}

/// Snapshot of the controller's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AdmissionMetricsSnapshot {
    pub admitted: u64,
    pub rejected: u64,
    pub fail_open: u64,
    pub unmetered: u64,
}

/// Lock-free admission counters.
#[derive(Debug, Default)]
pub struct AdmissionMetrics {
    admitted: AtomicU64,
    rejected: AtomicU64,
    fail_open: AtomicU64,
    unmetered: AtomicU64,
}

impl AdmissionMetrics {
    pub fn snapshot(&self) -> AdmissionMetricsSnapshot {
        AdmissionMetricsSnapshot {
            admitted: self.admitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            fail_open: self.fail_open.load(Ordering::Relaxed),
            unmetered: self.unmetered.load(Ordering::Relaxed),
        }
    }

    fn record(&self, decision: &Decision) {
        let counter = if !decision.allowed {
            &self.rejected
        } else if decision.is_metered() {
            &self.admitted
        } else {
            &self.unmetered
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Multi-scope admission controller.
///
/// Built once at startup and shared through `Arc`.
pub struct AdmissionController {
    registry: Arc<RuleRegistry>,
    backend: Arc<dyn CounterBackend>,
    key_prefix: String,
    exempt_paths: HashSet<String>,
    metrics: AdmissionMetrics,
}

impl AdmissionController {
    pub fn new(
        registry: Arc<RuleRegistry>,
        backend: Arc<dyn CounterBackend>,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            backend,
            key_prefix: key_prefix.into(),
            exempt_paths: HashSet::new(),
            metrics: AdmissionMetrics::default(),
        }
    }

    /// Paths that are never metered (health checks and the like).
    pub fn with_exempt_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exempt_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> AdmissionMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Decides whether the request may proceed, recording it against every
    /// scope evaluated before a rejection.
    ///
    /// Backend errors fail open: the request is allowed unmetered.
    pub async fn admit(&self, request: &AdmissionRequest) -> Decision {
        let decision = self.evaluate(request).await;
        self.metrics.record(&decision);
        decision
    }

    /// Reports quota usage for every scope that applies to the request
    /// without consuming any of it.
    ///
    /// Scopes whose backend lookup fails are left out.
    pub async fn status(&self, request: &AdmissionRequest) -> Vec<ScopeStatus> {
        let scopes = self.applicable_scopes(request);
        let lookups = scopes.iter().map(|(scope, rule)| {
            let key = CounterKey::new(&self.key_prefix, scope, rule);
            async move { (self.backend.peek(&key, rule, request.now).await, key) }
        });

        join_all(lookups)
            .await
            .into_iter()
            .zip(scopes.iter())
            .filter_map(|((result, key), (scope, rule))| match result {
                Ok(outcome) => Some(ScopeStatus::from_outcome(
                    scope.clone(),
                    rule,
                    &outcome,
                    request.now,
                )),
                Err(e) => {
                    error!(key = %key, error = %e, "Quota lookup failed");
                    None
                }
            })
            .collect()
    }

    async fn evaluate(&self, request: &AdmissionRequest) -> Decision {
        if self.exempt_paths.contains(&request.path) {
            return Decision::unmetered(request.now);
        }

        let mut overall = Decision::unmetered(request.now);
        for (scope, rule) in self.applicable_scopes(request) {
            let key = CounterKey::new(&self.key_prefix, &scope, rule);
            let outcome = match self.backend.evaluate_and_record(&key, rule, request.now).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.metrics.fail_open.fetch_add(1, Ordering::Relaxed);
                    error!(
                        scope = %scope,
                        key = %key,
                        error = %e,
                        "Admission check failed, allowing request"
                    );
                    return Decision::unmetered(request.now);
                }
            };

            let decision = Decision::from_outcome(&scope, rule, &outcome, request.now);
            if !decision.allowed {
                debug!(
                    scope = %scope,
                    limit = decision.limit,
                    retry_after_ms = decision.retry_after.map(|d| d.as_millis() as u64),
                    "Request rejected"
                );
                return decision;
            }
            overall = overall.most_restrictive(decision);
        }
        overall
    }

    /// Scopes with a configured rule, in evaluation order.
    fn applicable_scopes(&self, request: &AdmissionRequest) -> Vec<(Scope, &LimitRule)> {
        ScopeKind::EVALUATION_ORDER
            .iter()
            .filter_map(|&kind| {
                let scope = match kind {
                    ScopeKind::Global => Scope::Global,
                    ScopeKind::PerClient => Scope::PerClient(request.client_ip.clone()),
                    ScopeKind::PerEndpoint => Scope::PerEndpoint(request.path.clone()),
                    ScopeKind::PerUser => Scope::PerUser(request.user_id.clone()?),
                };
                self.registry
                    .lookup(kind, &request.path)
                    .map(|rule| (scope, rule))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::counter::LocalCounter;
    use crate::domain::admission::{CounterOutcome, RuleConfig};
    use crate::ports::BackendError;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    fn rule(kind: ScopeKind, max: u32, window: u32) -> LimitRule {
        LimitRule::new(kind, max, window).unwrap()
    }

    fn controller_with(rules: Vec<LimitRule>) -> AdmissionController {
        let registry = Arc::new(RuleRegistry::new(rules).unwrap());
        AdmissionController::new(registry, Arc::new(LocalCounter::new()), "ratelimit")
    }

    fn request(ip: &str, path: &str, secs: u64) -> AdmissionRequest {
        AdmissionRequest::new(Some(ip.to_string()), path, Timestamp::from_unix_secs(secs))
    }

    /// Records every key it sees and fails on demand.
    struct RecordingBackend {
        inner: LocalCounter,
        seen: Mutex<Vec<String>>,
        fail_with: Option<BackendError>,
    }

    impl RecordingBackend {
        fn new(fail_with: Option<BackendError>) -> Self {
            Self {
                inner: LocalCounter::new(),
                seen: Mutex::new(Vec::new()),
                fail_with,
            }
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CounterBackend for RecordingBackend {
        async fn evaluate_and_record(
            &self,
            key: &CounterKey,
            rule: &LimitRule,
            now: Timestamp,
        ) -> Result<CounterOutcome, BackendError> {
            self.seen.lock().unwrap().push(key.as_str().to_string());
            if let Some(err) = &self.fail_with {
                return Err(err.clone());
            }
            Ok(self.inner.evaluate(key, rule, now))
        }

        async fn peek(
            &self,
            key: &CounterKey,
            rule: &LimitRule,
            now: Timestamp,
        ) -> Result<CounterOutcome, BackendError> {
            if let Some(err) = &self.fail_with {
                return Err(err.clone());
            }
            Ok(self.inner.inspect(key, rule, now))
        }

        async fn health_check(&self) -> Result<(), BackendError> {
            Ok(())
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    // ─── Request construction ─────────────────────────────────────────

    #[test]
    fn missing_client_ip_becomes_unknown() {
        let req = AdmissionRequest::new(None, "/a", Timestamp::now());
        assert_eq!(req.client_ip, UNKNOWN_CLIENT);

        let req = AdmissionRequest::new(Some("  ".to_string()), "/a", Timestamp::now());
        assert_eq!(req.client_ip, UNKNOWN_CLIENT);
    }

    // ─── Admission ────────────────────────────────────────────────────

    #[tokio::test]
    async fn no_rules_means_unmetered_allow() {
        let controller = controller_with(vec![]);
        let decision = controller.admit(&request("1.1.1.1", "/x", 0)).await;

        assert!(decision.allowed);
        assert!(!decision.is_metered());
        assert_eq!(controller.metrics().unmetered, 1);
    }

    #[tokio::test]
    async fn scopes_are_evaluated_in_fixed_order() {
        let backend = Arc::new(RecordingBackend::new(None));
        let registry = RuleRegistry::new(vec![
            rule(ScopeKind::PerUser, 10, 60),
            rule(ScopeKind::PerEndpoint, 10, 60),
            rule(ScopeKind::PerClient, 10, 60),
            rule(ScopeKind::Global, 10, 60),
        ])
        .unwrap();
        let controller = AdmissionController::new(Arc::new(registry), backend.clone(), "rl");

        let req = request("1.2.3.4", "/docs", 0).with_user(UserId::new("u-1").unwrap());
        controller.admit(&req).await;

        assert_eq!(
            backend.seen(),
            vec![
                "rl:global:10r60s",
                "rl:client:1.2.3.4:10r60s",
                "rl:endpoint:/docs:10r60s",
                "rl:user:u-1:10r60s",
            ]
        );
    }

    #[tokio::test]
    async fn user_scope_skipped_for_anonymous_requests() {
        let backend = Arc::new(RecordingBackend::new(None));
        let registry = RuleRegistry::new(vec![rule(ScopeKind::PerUser, 10, 60)]).unwrap();
        let controller = AdmissionController::new(Arc::new(registry), backend.clone(), "rl");

        let decision = controller.admit(&request("1.2.3.4", "/docs", 0)).await;
        assert!(decision.allowed);
        assert!(backend.seen().is_empty());
    }

    #[tokio::test]
    async fn first_rejection_stops_evaluation() {
        let backend = Arc::new(RecordingBackend::new(None));
        let registry = RuleRegistry::new(vec![
            rule(ScopeKind::PerClient, 1, 60),
            rule(ScopeKind::PerEndpoint, 10, 60),
        ])
        .unwrap();
        let controller = AdmissionController::new(Arc::new(registry), backend.clone(), "rl");

        controller.admit(&request("1.2.3.4", "/a", 0)).await;
        let decision = controller.admit(&request("1.2.3.4", "/a", 1)).await;

        assert!(!decision.allowed);
        assert_eq!(
            decision.violated_scope,
            Some(Scope::PerClient("1.2.3.4".to_string()))
        );
        // Two client checks, but the endpoint scope was only reached once.
        assert_eq!(
            backend
                .seen()
                .iter()
                .filter(|k| k.starts_with("rl:endpoint"))
                .count(),
            1
        );
        assert_eq!(controller.metrics().rejected, 1);
    }

    #[tokio::test]
    async fn passing_decision_reports_most_restrictive_scope() {
        let controller = controller_with(vec![
            rule(ScopeKind::Global, 1000, 60),
            rule(ScopeKind::PerClient, 5, 60),
        ]);

        let decision = controller.admit(&request("1.2.3.4", "/a", 0)).await;
        assert!(decision.allowed);
        assert_eq!(decision.limit, 5);
        assert_eq!(decision.remaining, 4);
    }

    #[tokio::test]
    async fn endpoint_override_applies_only_to_its_path() {
        let login = RuleConfig {
            scope: ScopeKind::PerEndpoint,
            max_requests: 2,
            window_seconds: 300,
            burst_allowance: None,
            path_override: Some("/api/v1/auth/login".to_string()),
        }
        .into_rule()
        .unwrap();
        let controller = controller_with(vec![login]);

        for secs in 0..2 {
            assert!(controller.admit(&request("1.1.1.1", "/api/v1/auth/login", secs)).await.allowed);
        }
        assert!(!controller.admit(&request("2.2.2.2", "/api/v1/auth/login", 3)).await.allowed);

        let other = controller.admit(&request("1.1.1.1", "/api/v1/docs", 3)).await;
        assert!(other.allowed);
        assert!(!other.is_metered());
    }

    #[tokio::test]
    async fn exempt_paths_are_not_metered() {
        let controller = controller_with(vec![rule(ScopeKind::Global, 1, 60)])
            .with_exempt_paths(["/health"]);

        for secs in 0..5 {
            let decision = controller.admit(&request("1.1.1.1", "/health", secs)).await;
            assert!(decision.allowed);
            assert!(!decision.is_metered());
        }
        assert!(controller.admit(&request("1.1.1.1", "/a", 6)).await.allowed);
    }

    #[tokio::test]
    async fn backend_errors_fail_open() {
        let backend = Arc::new(RecordingBackend::new(Some(BackendError::Internal(
            "unexpected reply".to_string(),
        ))));
        let registry = RuleRegistry::new(vec![rule(ScopeKind::Global, 1, 60)]).unwrap();
        let controller = AdmissionController::new(Arc::new(registry), backend, "rl");

        for secs in 0..3 {
            let decision = controller.admit(&request("1.1.1.1", "/a", secs)).await;
            assert!(decision.allowed);
            assert!(!decision.is_metered());
        }
        assert_eq!(controller.metrics().fail_open, 3);
    }

    #[tokio::test]
    async fn rejection_carries_retry_after() {
        let controller = controller_with(vec![rule(ScopeKind::PerClient, 1, 60)]);

        controller.admit(&request("1.1.1.1", "/a", 100)).await;
        let decision = controller.admit(&request("1.1.1.1", "/a", 110)).await;

        assert!(!decision.allowed);
        assert_eq!(decision.retry_after, Some(Duration::from_secs(50)));
        assert_eq!(decision.reset_at, Timestamp::from_unix_secs(160));
    }

    // ─── Status ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn status_never_consumes_quota() {
        let controller = controller_with(vec![
            rule(ScopeKind::Global, 100, 60),
            rule(ScopeKind::PerClient, 3, 60),
        ]);
        controller.admit(&request("1.1.1.1", "/a", 0)).await;

        let first = controller.status(&request("1.1.1.1", "/a", 1)).await;
        for _ in 0..10 {
            assert_eq!(controller.status(&request("1.1.1.1", "/a", 1)).await, first);
        }

        assert_eq!(first.len(), 2);
        assert_eq!(first[1].scope, Scope::PerClient("1.1.1.1".to_string()));
        assert_eq!(first[1].remaining, 2);
    }

    #[tokio::test]
    async fn status_skips_failed_lookups() {
        let backend = Arc::new(RecordingBackend::new(Some(BackendError::Internal("x".into()))));
        let registry = RuleRegistry::new(vec![rule(ScopeKind::Global, 1, 60)]).unwrap();
        let controller = AdmissionController::new(Arc::new(registry), backend, "rl");

        assert!(controller.status(&request("1.1.1.1", "/a", 0)).await.is_empty());
    }
}
