//! Redis-backed counter for multi-instance deployments.
//!
//! Each key is a sorted set of admitted-request timestamps (score = ms since
//! epoch). A Lua script prunes, counts and conditionally inserts in one round
//! trip, so concurrent instances never over-admit a key.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use redis::aio::ConnectionManager;
use redis::{ErrorKind, RedisError, RedisResult, Script};
use tokio::sync::RwLock;
use tokio::time::timeout;
use uuid::Uuid;

use crate::domain::admission::{CounterKey, CounterOutcome, LimitRule};
use crate::domain::foundation::Timestamp;
use crate::ports::{BackendError, CounterBackend};

/// Prune, count, and insert if under the limit.
///
/// KEYS[1] counter key
/// ARGV[1] now (ms), ARGV[2] cutoff (ms), ARGV[3] max requests,
/// ARGV[4] unique member, ARGV[5] key TTL (s)
///
/// Returns `{allowed, count, oldest_ms}` with `oldest_ms = -1` when empty.
static EVALUATE_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
        redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', '(' .. ARGV[2])
        local count = redis.call('ZCARD', KEYS[1])
        local allowed = 0
        if count < tonumber(ARGV[3]) then
            redis.call('ZADD', KEYS[1], ARGV[1], ARGV[4])
            count = count + 1
            allowed = 1
        end
        if count > 0 then
            redis.call('EXPIRE', KEYS[1], ARGV[5])
        end
        local oldest = redis.call('ZRANGE', KEYS[1], 0, 0, 'WITHSCORES')
        local oldest_ms = -1
        if oldest[2] then
            oldest_ms = tonumber(oldest[2])
        end
        return {allowed, count, oldest_ms}
        "#,
    )
});

/// Count entries at or after the cutoff without modifying the key.
///
/// KEYS[1] counter key, ARGV[1] cutoff (ms). Returns `{count, oldest_ms}`.
static PEEK_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
        local count = redis.call('ZCOUNT', KEYS[1], ARGV[1], '+inf')
        local oldest = redis.call('ZRANGEBYSCORE', KEYS[1], ARGV[1], '+inf', 'WITHSCORES', 'LIMIT', 0, 1)
        local oldest_ms = -1
        if oldest[2] then
            oldest_ms = tonumber(oldest[2])
        end
        return {count, oldest_ms}
        "#,
    )
});

/// Distributed sliding-window counter on Redis sorted sets.
///
/// The connection is opened lazily on first use and reused afterwards;
/// [`ConnectionManager`] reconnects on its own after a drop. Every command
/// is bounded by `command_timeout` so a slow Redis cannot stall requests.
pub struct RedisCounter {
    client: redis::Client,
    conn: RwLock<Option<ConnectionManager>>,
    command_timeout: Duration,
}

impl RedisCounter {
    /// Create a counter for the given Redis URL.
    ///
    /// Only the URL is validated here; no connection is attempted.
    pub fn new(url: &str, command_timeout: Duration) -> Result<Self, BackendError> {
        let client = redis::Client::open(url)
            .map_err(|e| BackendError::Internal(format!("invalid redis url: {}", e)))?;
        Ok(Self {
            client,
            conn: RwLock::new(None),
            command_timeout,
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, BackendError> {
        if let Some(conn) = self.conn.read().await.as_ref() {
            return Ok(conn.clone());
        }

        let mut slot = self.conn.write().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }

        let conn = self.bounded(self.client.get_connection_manager()).await?;
        *slot = Some(conn.clone());
        Ok(conn)
    }

    /// Runs a Redis future under the command timeout.
    async fn bounded<T, F>(&self, fut: F) -> Result<T, BackendError>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match timeout(self.command_timeout, fut).await {
            Ok(result) => result.map_err(map_redis_error),
            Err(_) => Err(BackendError::Timeout(self.command_timeout)),
        }
    }
}

#[async_trait]
impl CounterBackend for RedisCounter {
    async fn evaluate_and_record(
        &self,
        key: &CounterKey,
        rule: &LimitRule,
        now: Timestamp,
    ) -> Result<CounterOutcome, BackendError> {
        let mut conn = self.connection().await?;
        let now_ms = now.as_unix_millis();
        let cutoff_ms = now_ms - rule.window_millis();
        let member = format!("{}-{}", now_ms, Uuid::new_v4());

        let mut invocation = EVALUATE_SCRIPT.prepare_invoke();
        invocation
            .key(key.as_str())
            .arg(now_ms.to_string())
            .arg(cutoff_ms.to_string())
            .arg(rule.max_requests())
            .arg(member)
            .arg(rule.window_seconds());

        let reply: Vec<i64> = self.bounded(invocation.invoke_async(&mut conn)).await?;
        match reply.as_slice() {
            [allowed, count, oldest_ms] => {
                let count = clamp_count(*count);
                let oldest = oldest_from_reply(*oldest_ms);
                Ok(if *allowed == 1 {
                    CounterOutcome::allowed(count, oldest)
                } else {
                    CounterOutcome::rejected(count, oldest)
                })
            }
            other => Err(BackendError::Internal(format!(
                "unexpected evaluate reply: {:?}",
                other
            ))),
        }
    }

    async fn peek(
        &self,
        key: &CounterKey,
        rule: &LimitRule,
        now: Timestamp,
    ) -> Result<CounterOutcome, BackendError> {
        let mut conn = self.connection().await?;
        let cutoff_ms = now.as_unix_millis() - rule.window_millis();

        let mut invocation = PEEK_SCRIPT.prepare_invoke();
        invocation.key(key.as_str()).arg(cutoff_ms.to_string());

        let reply: Vec<i64> = self.bounded(invocation.invoke_async(&mut conn)).await?;
        match reply.as_slice() {
            [count, oldest_ms] => {
                let count = clamp_count(*count);
                Ok(CounterOutcome {
                    allowed: count < rule.max_requests(),
                    count,
                    oldest: oldest_from_reply(*oldest_ms),
                    retry_hint: None,
                })
            }
            other => Err(BackendError::Internal(format!(
                "unexpected peek reply: {:?}",
                other
            ))),
        }
    }

    async fn health_check(&self) -> Result<(), BackendError> {
        let mut conn = self.connection().await?;
        let pong: String = self
            .bounded(redis::cmd("PING").query_async(&mut conn))
            .await?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(BackendError::Internal(format!("unexpected PING reply: {}", pong)))
        }
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

/// Classifies a Redis error: connectivity problems trigger the fallback,
/// everything else is an internal error.
pub(crate) fn map_redis_error(err: RedisError) -> BackendError {
    let unreachable = err.is_io_error()
        || err.is_connection_refusal()
        || err.is_connection_dropped()
        || err.is_timeout()
        || matches!(
            err.kind(),
            ErrorKind::IoError
                | ErrorKind::BusyLoadingError
                | ErrorKind::TryAgain
                | ErrorKind::ClusterDown
                | ErrorKind::MasterDown
        );

    if unreachable {
        BackendError::Unavailable(err.to_string())
    } else {
        BackendError::Internal(err.to_string())
    }
}

fn clamp_count(raw: i64) -> u32 {
    u32::try_from(raw.max(0)).unwrap_or(u32::MAX)
}

fn oldest_from_reply(raw: i64) -> Option<Timestamp> {
    (raw >= 0).then(|| Timestamp::from_unix_millis(raw))
}
