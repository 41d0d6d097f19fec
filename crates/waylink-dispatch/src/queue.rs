// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Enqueue operations and queue snapshots.
//!
//! Bulk submissions fan out to one job per recipient, each with its own
//! `not_before` staggered by position, so recipients are never blocked
//! behind one slow or failing call.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;
use waylink_config::model::DispatchConfig;
use waylink_core::types::JobKind;
use waylink_core::WaylinkError;
use waylink_storage::queries::jobs::{self, NewJob, QueueCounts};
use waylink_storage::Database;

/// Format a UTC time the way timestamp columns store it.
fn to_iso(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Enqueue-side facade over the durable job queue.
#[derive(Clone)]
pub struct DispatchQueue {
    db: Database,
    config: DispatchConfig,
}

impl DispatchQueue {
    pub fn new(db: Database, config: DispatchConfig) -> Self {
        Self { db, config }
    }

    /// Enqueue an immediate single send. Returns the job id.
    pub async fn enqueue_single(
        &self,
        tenant_id: &str,
        account_id: &str,
        recipient: &str,
        payload: &str,
        message_id: Option<String>,
    ) -> Result<i64, WaylinkError> {
        jobs::enqueue(
            &self.db,
            &NewJob {
                tenant_id: tenant_id.to_string(),
                account_id: account_id.to_string(),
                recipient: recipient.to_string(),
                payload: payload.to_string(),
                kind: JobKind::Single,
                batch_id: None,
                message_id,
                max_attempts: self.config.max_attempts,
                not_before: to_iso(Utc::now()),
            },
        )
        .await
    }

    /// Enqueue a bulk send: one job per recipient, the i-th eligible no
    /// earlier than `submission + i × delay_between`. Returns the job ids
    /// in recipient order.
    pub async fn enqueue_bulk(
        &self,
        tenant_id: &str,
        account_id: &str,
        recipients: &[String],
        payload: &str,
        delay_between: Duration,
    ) -> Result<Vec<i64>, WaylinkError> {
        let submission = Utc::now();
        let batch_id = uuid::Uuid::new_v4().to_string();
        let delay = ChronoDuration::from_std(delay_between)
            .map_err(|e| WaylinkError::Internal(format!("bulk delay out of range: {e}")))?;

        let mut ids = Vec::with_capacity(recipients.len());
        for (position, recipient) in recipients.iter().enumerate() {
            let not_before = submission + delay * position as i32;
            let id = jobs::enqueue(
                &self.db,
                &NewJob {
                    tenant_id: tenant_id.to_string(),
                    account_id: account_id.to_string(),
                    recipient: recipient.clone(),
                    payload: payload.to_string(),
                    kind: JobKind::BulkItem,
                    batch_id: Some(batch_id.clone()),
                    message_id: None,
                    max_attempts: self.config.max_attempts,
                    not_before: to_iso(not_before),
                },
            )
            .await?;
            ids.push(id);
        }
        Ok(ids)
    }

    /// Enqueue a scheduled send, not claimable before `send_at`.
    pub async fn enqueue_scheduled(
        &self,
        tenant_id: &str,
        account_id: &str,
        recipient: &str,
        payload: &str,
        send_at: DateTime<Utc>,
        message_id: Option<String>,
    ) -> Result<i64, WaylinkError> {
        jobs::enqueue(
            &self.db,
            &NewJob {
                tenant_id: tenant_id.to_string(),
                account_id: account_id.to_string(),
                recipient: recipient.to_string(),
                payload: payload.to_string(),
                kind: JobKind::Scheduled,
                batch_id: None,
                message_id,
                max_attempts: self.config.max_attempts,
                not_before: to_iso(send_at),
            },
        )
        .await
    }

    /// Re-enqueue all dead-lettered jobs for a tenant with reset attempt
    /// counters. Returns how many were revived.
    pub async fn retry_failed(&self, tenant_id: &str) -> Result<u64, WaylinkError> {
        let revived = jobs::retry_dead_lettered(&self.db, tenant_id).await?;
        if revived > 0 {
            tracing::info!(tenant = tenant_id, revived, "dead-lettered jobs re-enqueued");
        }
        Ok(revived)
    }

    /// Withdraw a job that has not been claimed yet.
    pub async fn cancel(&self, job_id: i64) -> Result<bool, WaylinkError> {
        jobs::cancel_pending(&self.db, job_id).await
    }

    /// Per-status job counts for a tenant.
    pub async fn counts(&self, tenant_id: &str) -> Result<QueueCounts, WaylinkError> {
        jobs::counts_for_tenant(&self.db, tenant_id).await
    }
}


#[cfg(test)]
impl DispatchQueue {
    /// Test access to the underlying database.
    pub(crate) fn db(&self) -> &Database {
        &self.db
    }
}
