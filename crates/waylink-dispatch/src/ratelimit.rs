// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-tenant token-bucket rate limiting.
//!
//! Each tenant gets a minute bucket and an hour bucket; an execution slot
//! requires a token from both. Over-limit callers wait, they never fail.
//! Buckets refill continuously, so burst capacity equals the per-minute
//! (resp. per-hour) ceiling.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use waylink_config::model::DispatchConfig;

/// A continuously refilling token bucket.
#[derive(Debug)]
struct Bucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(capacity: u32, period: Duration) -> Self {
        let capacity = capacity as f64;
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec: capacity / period.as_secs_f64(),
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    /// Time until one token is available; zero when one is ready now.
    fn wait_for_one(&self) -> Duration {
        if self.tokens >= 1.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((1.0 - self.tokens) / self.refill_per_sec)
        }
    }

    fn available(&self) -> u32 {
        self.tokens.floor().max(0.0) as u32
    }
}

/// Remaining per-tenant capacity, for usage snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateSnapshot {
    pub minute_remaining: u32,
    pub hour_remaining: u32,
    pub per_minute: u32,
    pub per_hour: u32,
}

/// Per-tenant dual token-bucket limiter.
pub struct TenantRateLimiter {
    per_minute: u32,
    per_hour: u32,
    buckets: DashMap<String, Arc<Mutex<(Bucket, Bucket)>>>,
}

impl TenantRateLimiter {
    pub fn new(config: &DispatchConfig) -> Self {
        Self {
            per_minute: config.rate_per_minute,
            per_hour: config.rate_per_hour,
            buckets: DashMap::new(),
        }
    }

    fn cell(&self, tenant_id: &str) -> Arc<Mutex<(Bucket, Bucket)>> {
        self.buckets
            .entry(tenant_id.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new((
                    Bucket::new(self.per_minute, Duration::from_secs(60)),
                    Bucket::new(self.per_hour, Duration::from_secs(3_600)),
                )))
            })
            .clone()
    }

    /// Take one execution slot, without waiting. Returns how long the
    /// caller must wait when the tenant is over its ceiling.
    pub async fn try_acquire(&self, tenant_id: &str) -> Result<(), Duration> {
        let cell = self.cell(tenant_id);
        let mut buckets = cell.lock().await;
        let now = Instant::now();
        buckets.0.refill(now);
        buckets.1.refill(now);

        let wait = buckets.0.wait_for_one().max(buckets.1.wait_for_one());
        if wait.is_zero() {
            buckets.0.tokens -= 1.0;
            buckets.1.tokens -= 1.0;
            Ok(())
        } else {
            Err(wait)
        }
    }

    /// Take one execution slot, waiting as long as necessary.
    pub async fn acquire(&self, tenant_id: &str) {
        loop {
            match self.try_acquire(tenant_id).await {
                Ok(()) => return,
                Err(wait) => tokio::time::sleep(wait).await,
            }
        }
    }

    /// Remaining capacity for a tenant.
    pub async fn snapshot(&self, tenant_id: &str) -> RateSnapshot {
        let cell = self.cell(tenant_id);
        let mut buckets = cell.lock().await;
        let now = Instant::now();
        buckets.0.refill(now);
        buckets.1.refill(now);
        RateSnapshot {
            minute_remaining: buckets.0.available(),
            hour_remaining: buckets.1.available(),
            per_minute: self.per_minute,
            per_hour: self.per_hour,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(per_minute: u32, per_hour: u32) -> TenantRateLimiter {
        TenantRateLimiter::new(&DispatchConfig {
            rate_per_minute: per_minute,
            rate_per_hour: per_hour,
            ..DispatchConfig::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn burst_up_to_minute_capacity_then_wait() {
        let limiter = limiter(3, 1_000);

        for _ in 0..3 {
            assert!(limiter.try_acquire("tenant-1").await.is_ok());
        }
        let wait = limiter.try_acquire("tenant-1").await.unwrap_err();
        assert!(wait > Duration::ZERO);

        // One refill period later the tenant can send again.
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(limiter.try_acquire("tenant-1").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn tenants_do_not_share_buckets() {
        let limiter = limiter(1, 1_000);

        assert!(limiter.try_acquire("tenant-a").await.is_ok());
        assert!(limiter.try_acquire("tenant-a").await.is_err());
        // Tenant B is unaffected by A's exhaustion.
        assert!(limiter.try_acquire("tenant-b").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn hour_ceiling_binds_when_tighter() {
        let limiter = limiter(10, 2);

        assert!(limiter.try_acquire("tenant-1").await.is_ok());
        assert!(limiter.try_acquire("tenant-1").await.is_ok());
        // Minute bucket still has tokens; hour bucket is empty.
        let wait = limiter.try_acquire("tenant-1").await.unwrap_err();
        assert!(wait > Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_waits_instead_of_failing() {
        let limiter = Arc::new(limiter(1, 1_000));
        limiter.try_acquire("tenant-1").await.unwrap();

        let l = limiter.clone();
        let waiter = tokio::spawn(async move {
            l.acquire("tenant-1").await;
        });

        // With paused time the waiter's sleep completes as the runtime
        // auto-advances; it must finish without an error path.
        waiter.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_reports_remaining_capacity() {
        let limiter = limiter(5, 100);
        limiter.try_acquire("tenant-1").await.unwrap();
        limiter.try_acquire("tenant-1").await.unwrap();

        let snapshot = limiter.snapshot("tenant-1").await;
        assert_eq!(snapshot.minute_remaining, 3);
        assert_eq!(snapshot.hour_remaining, 98);
        assert_eq!(snapshot.per_minute, 5);
        assert_eq!(snapshot.per_hour, 100);
    }
}
