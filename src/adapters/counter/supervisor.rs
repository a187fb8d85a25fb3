//! Degradation supervisor - switches between the shared and the local counter.
//!
//! While the distributed backend is healthy every check goes there. The
//! first connectivity failure flips the supervisor into degraded mode and
//! the failing call is answered locally instead of being dropped. A
//! background loop probes the distributed backend and flips back once it
//! answers again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time;
use tracing::{debug, info, warn};

use crate::domain::admission::{BackendMode, CounterKey, CounterOutcome, LimitRule};
use crate::domain::foundation::{StateMachine, Timestamp};
use crate::ports::{BackendError, CounterBackend};

use super::LocalCounter;

/// Configuration for the supervisor's background loop.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// How often to probe the distributed backend and sweep idle local keys.
    ///
    /// Default: 5 seconds
    pub probe_interval: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(5),
        }
    }
}

impl SupervisorConfig {
    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }
}

/// Point-in-time view of the supervisor, served by the backend endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupervisorMetrics {
    pub mode: BackendMode,
    pub degradations: u64,
    pub recoveries: u64,
    pub fallback_evaluations: u64,
    pub local_keys: usize,
    pub last_probe_error: Option<String>,
}

/// Counter backend that routes to Redis or to the local fallback.
pub struct DegradationSupervisor {
    distributed: Arc<dyn CounterBackend>,
    local: Arc<LocalCounter>,
    mode: RwLock<BackendMode>,
    config: SupervisorConfig,
    degradations: AtomicU64,
    recoveries: AtomicU64,
    fallback_evaluations: AtomicU64,
    last_probe_error: Mutex<Option<String>>,
}

impl DegradationSupervisor {
    /// Creates a supervisor in distributed mode.
    pub fn new(
        distributed: Arc<dyn CounterBackend>,
        local: Arc<LocalCounter>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            distributed,
            local,
            mode: RwLock::new(BackendMode::Distributed),
            config,
            degradations: AtomicU64::new(0),
            recoveries: AtomicU64::new(0),
            fallback_evaluations: AtomicU64::new(0),
            last_probe_error: Mutex::new(None),
        }
    }

    /// Current mode.
    pub fn mode(&self) -> BackendMode {
        *self.mode.read()
    }

    pub fn local(&self) -> &Arc<LocalCounter> {
        &self.local
    }

    pub fn metrics(&self) -> SupervisorMetrics {
        SupervisorMetrics {
            mode: self.mode(),
            degradations: self.degradations.load(Ordering::Relaxed),
            recoveries: self.recoveries.load(Ordering::Relaxed),
            fallback_evaluations: self.fallback_evaluations.load(Ordering::Relaxed),
            local_keys: self.local.len(),
            last_probe_error: self.last_probe_error.lock().clone(),
        }
    }

    /// Checks the distributed backend once and sets the mode accordingly.
    pub async fn probe(&self) -> BackendMode {
        match self.distributed.health_check().await {
            Ok(()) => {
                *self.last_probe_error.lock() = None;
                if self.switch_to(BackendMode::Distributed) {
                    self.recoveries.fetch_add(1, Ordering::Relaxed);
                    info!(
                        backend = self.distributed.name(),
                        "Distributed counter reachable again, leaving degraded mode"
                    );
                }
            }
            Err(e) => {
                *self.last_probe_error.lock() = Some(e.to_string());
                if self.switch_to(BackendMode::Degraded) {
                    self.degradations.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        backend = self.distributed.name(),
                        error = %e,
                        "Health probe failed, entering degraded mode"
                    );
                } else {
                    debug!(error = %e, "Distributed counter still unreachable");
                }
            }
        }
        self.mode()
    }

    /// Probes and sweeps idle local keys until shutdown is signalled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.config.probe_interval);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Degradation supervisor stopping");
                        return;
                    }
                }

                _ = interval.tick() => {
                    self.probe().await;
                    let pruned = self.local.prune_idle(Timestamp::now());
                    if pruned > 0 {
                        debug!(pruned, remaining = self.local.len(), "Swept idle local counters");
                    }
                }
            }
        }
    }

    /// Moves to `target` if that is a valid transition. Returns whether the
    /// mode changed.
    fn switch_to(&self, target: BackendMode) -> bool {
        let mut mode = self.mode.write();
        match mode.transition_to(target) {
            Ok(next) => {
                *mode = next;
                true
            }
            Err(_) => false,
        }
    }

    fn degrade(&self, key: &CounterKey, error: &BackendError) {
        if self.switch_to(BackendMode::Degraded) {
            self.degradations.fetch_add(1, Ordering::Relaxed);
            warn!(
                backend = self.distributed.name(),
                key = %key,
                error = %error,
                "Distributed counter unavailable, falling back to local counting"
            );
        }
    }
}

#[async_trait]
impl CounterBackend for DegradationSupervisor {
    async fn evaluate_and_record(
        &self,
        key: &CounterKey,
        rule: &LimitRule,
        now: Timestamp,
    ) -> Result<CounterOutcome, BackendError> {
        if self.mode() == BackendMode::Distributed {
            match self.distributed.evaluate_and_record(key, rule, now).await {
                Err(e) if e.is_unavailable() => self.degrade(key, &e),
                other => return other,
            }
        }

        self.fallback_evaluations.fetch_add(1, Ordering::Relaxed);
        self.local.evaluate_and_record(key, rule, now).await
    }

    async fn peek(
        &self,
        key: &CounterKey,
        rule: &LimitRule,
        now: Timestamp,
    ) -> Result<CounterOutcome, BackendError> {
        if self.mode() == BackendMode::Distributed {
            match self.distributed.peek(key, rule, now).await {
                Err(e) if e.is_unavailable() => self.degrade(key, &e),
                other => return other,
            }
        }

        self.local.peek(key, rule, now).await
    }

    async fn health_check(&self) -> Result<(), BackendError> {
        match self.mode() {
            BackendMode::Distributed => self.distributed.health_check().await,
            BackendMode::Degraded => self.local.health_check().await,
        }
    }

    fn name(&self) -> &'static str {
        match self.mode() {
            BackendMode::Distributed => self.distributed.name(),
            BackendMode::Degraded => self.local.name(),
        }
    }
}
