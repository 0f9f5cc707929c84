use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::Mutex;

use fluxbase_core::rate_limit::{RateLimitConfig, RateLimitKey, RateLimitResult};
use fluxbase_core::{FluxbaseError, Principal, RequestMetadata, Result};

/// Builds the bucket key a rate limiter uses to identify a caller + action pair.
pub fn build_key(
    key_type: RateLimitKey,
    action_name: &str,
    principal: &Principal,
    request: &RequestMetadata,
) -> String {
    match key_type {
        RateLimitKey::User => {
            let user_id = principal
                .user_id()
                .map(|u| u.to_string())
                .unwrap_or_else(|| "anonymous".to_string());
            format!("user:{user_id}:{action_name}")
        }
        RateLimitKey::Ip => {
            let ip = request.client_ip.as_deref().unwrap_or("unknown");
            format!("ip:{ip}:{action_name}")
        }
        RateLimitKey::UserAction => {
            let user_id = principal
                .user_id()
                .map(|u| u.to_string())
                .unwrap_or_else(|| "anonymous".to_string());
            format!("user_action:{user_id}:{action_name}")
        }
        RateLimitKey::Global => {
            format!("global:{action_name}")
        }
    }
}

/// Abstracts the token-bucket store so procedures and gateway middleware can
/// be rate limited either by an in-memory limiter (single-node default) or a
/// Postgres-backed one (multi-node deployments sharing one limit).
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check(&self, bucket_key: &str, config: &RateLimitConfig) -> Result<RateLimitResult>;

    async fn enforce(&self, bucket_key: &str, config: &RateLimitConfig) -> Result<RateLimitResult> {
        let result = self.check(bucket_key, config).await?;
        if !result.allowed {
            return Err(FluxbaseError::RateLimitExceeded {
                retry_after: result.retry_after.unwrap_or(Duration::from_secs(1)),
                limit: config.requests,
                remaining: result.remaining,
            });
        }
        Ok(result)
    }

    async fn reset(&self, bucket_key: &str) -> Result<()>;
}

struct Bucket {
    tokens: f64,
    last_refill: DateTime<Utc>,
}

/// Default in-process rate limiter: one token bucket per key behind its own
/// lock, with idle buckets garbage-collected on access so memory does not
/// grow unbounded for long-lived high-cardinality keys (e.g. per-IP).
pub struct InMemoryRateLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
    idle_ttl: Duration,
}

impl Default for InMemoryRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRateLimiter {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            idle_ttl: Duration::from_secs(3600),
        }
    }

    fn gc(buckets: &mut HashMap<String, Bucket>, now: DateTime<Utc>, idle_ttl: Duration) {
        buckets.retain(|_, b| {
            (now - b.last_refill)
                .to_std()
                .map(|age| age < idle_ttl)
                .unwrap_or(true)
        });
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check(&self, bucket_key: &str, config: &RateLimitConfig) -> Result<RateLimitResult> {
        let max_tokens = config.requests as f64;
        let refill_rate = config.refill_rate();
        let now = Utc::now();

        let mut buckets = self.buckets.lock().await;
        if buckets.len() > 10_000 {
            Self::gc(&mut buckets, now, self.idle_ttl);
        }

        let bucket = buckets.entry(bucket_key.to_string()).or_insert_with(|| Bucket {
            tokens: max_tokens,
            last_refill: now,
        });

        let elapsed = (now - bucket.last_refill).to_std().unwrap_or_default();
        bucket.tokens = (bucket.tokens + elapsed.as_secs_f64() * refill_rate).min(max_tokens);
        bucket.last_refill = now;

        let reset_at = now
            + chrono::Duration::seconds(((max_tokens - bucket.tokens) / refill_rate).max(0.0) as i64);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(RateLimitResult::allowed(bucket.tokens.max(0.0) as u32, reset_at))
        } else {
            let retry_after = Duration::from_secs_f64(((1.0 - bucket.tokens) / refill_rate).max(0.0));
            Ok(RateLimitResult::denied(0, reset_at, retry_after))
        }
    }

    async fn reset(&self, bucket_key: &str) -> Result<()> {
        self.buckets.lock().await.remove(bucket_key);
        Ok(())
    }
}

/// Rate limiter backed by PostgreSQL, for deployments where multiple gateway
/// processes must share one limit. Implements the same token-bucket algorithm
/// as `InMemoryRateLimiter` via an atomic `INSERT ... ON CONFLICT` upsert.
pub struct PostgresRateLimiter {
    pool: PgPool,
}

impl PostgresRateLimiter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn cleanup(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM fluxbase_rate_limits WHERE created_at < $1")
            .bind(older_than)
            .execute(&self.pool)
            .await
            .map_err(FluxbaseError::from_sqlx)?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RateLimiter for PostgresRateLimiter {
    async fn check(&self, bucket_key: &str, config: &RateLimitConfig) -> Result<RateLimitResult> {
        let max_tokens = config.requests as f64;
        let refill_rate = config.refill_rate();

        let row: (f64, DateTime<Utc>, bool) = sqlx::query_as(
            r#"
            INSERT INTO fluxbase_rate_limits (bucket_key, tokens, last_refill, max_tokens, refill_rate)
            VALUES ($1, $2 - 1, NOW(), $2, $3)
            ON CONFLICT (bucket_key) DO UPDATE SET
                tokens = LEAST(
                    fluxbase_rate_limits.max_tokens,
                    fluxbase_rate_limits.tokens +
                        (EXTRACT(EPOCH FROM (NOW() - fluxbase_rate_limits.last_refill)) * fluxbase_rate_limits.refill_rate)
                ) - 1,
                last_refill = NOW()
            RETURNING tokens, last_refill, (tokens >= 0) as allowed
            "#,
        )
        .bind(bucket_key)
        .bind(max_tokens)
        .bind(refill_rate)
        .fetch_one(&self.pool)
        .await
        .map_err(FluxbaseError::from_sqlx)?;

        let (tokens, last_refill, allowed) = row;
        let remaining = tokens.max(0.0) as u32;
        let reset_at =
            last_refill + chrono::Duration::seconds(((max_tokens - tokens) / refill_rate).max(0.0) as i64);

        if allowed {
            Ok(RateLimitResult::allowed(remaining, reset_at))
        } else {
            let retry_after = Duration::from_secs_f64(((1.0 - tokens) / refill_rate).max(0.0));
            Ok(RateLimitResult::denied(remaining, reset_at, retry_after))
        }
    }

    async fn reset(&self, bucket_key: &str) -> Result<()> {
        sqlx::query("DELETE FROM fluxbase_rate_limits WHERE bucket_key = $1")
            .bind(bucket_key)
            .execute(&self.pool)
            .await
            .map_err(FluxbaseError::from_sqlx)?;
        Ok(())
    }
}

pub type SharedRateLimiter = Arc<dyn RateLimiter>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_allows_within_limit() {
        let limiter = InMemoryRateLimiter::new();
        let config = RateLimitConfig::new(5, Duration::from_secs(60));

        for _ in 0..5 {
            let result = limiter.check("bucket-a", &config).await.unwrap();
            assert!(result.allowed);
        }

        let result = limiter.check("bucket-a", &config).await.unwrap();
        assert!(!result.allowed);
        assert!(result.retry_after.is_some());
    }

    #[tokio::test]
    async fn test_in_memory_buckets_independent() {
        let limiter = InMemoryRateLimiter::new();
        let config = RateLimitConfig::new(1, Duration::from_secs(60));

        assert!(limiter.check("a", &config).await.unwrap().allowed);
        assert!(limiter.check("b", &config).await.unwrap().allowed);
        assert!(!limiter.check("a", &config).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_reset_clears_bucket() {
        let limiter = InMemoryRateLimiter::new();
        let config = RateLimitConfig::new(1, Duration::from_secs(60));

        assert!(limiter.check("a", &config).await.unwrap().allowed);
        assert!(!limiter.check("a", &config).await.unwrap().allowed);

        limiter.reset("a").await.unwrap();
        assert!(limiter.check("a", &config).await.unwrap().allowed);
    }

    #[test]
    fn test_build_key_variants() {
        let principal = Principal::anon();
        let request = RequestMetadata::default();

        assert_eq!(
            build_key(RateLimitKey::Global, "login", &principal, &request),
            "global:login"
        );
        assert!(build_key(RateLimitKey::User, "login", &principal, &request).starts_with("user:"));
    }
}
