// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable dispatch-job queue.
//!
//! Jobs are rows; enqueue is synchronous and survives restart. Workers
//! claim the oldest due pending job inside a transaction, which sets a
//! lock timeout so a crashed worker's job returns to the queue.

use rusqlite::{params, OptionalExtension};
use waylink_core::types::JobKind;
use waylink_core::WaylinkError;

use crate::database::{map_tr_err, now_iso, Database};
use crate::models::DispatchJob;
use crate::queries::parse_text_enum;

/// Fields for a newly enqueued job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub tenant_id: String,
    pub account_id: String,
    pub recipient: String,
    pub payload: String,
    pub kind: JobKind,
    pub batch_id: Option<String>,
    pub message_id: Option<String>,
    pub max_attempts: u32,
    /// Earliest-send time, ISO 8601 UTC.
    pub not_before: String,
}

/// Per-status job counts for a tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub pending: u64,
    pub running: u64,
    pub delivered: u64,
    pub dead_lettered: u64,
}

fn row_to_job(row: &rusqlite::Row<'_>) -> Result<DispatchJob, rusqlite::Error> {
    Ok(DispatchJob {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        account_id: row.get(2)?,
        recipient: row.get(3)?,
        payload: row.get(4)?,
        kind: parse_text_enum(row.get::<_, String>(5)?)?,
        batch_id: row.get(6)?,
        message_id: row.get(7)?,
        status: parse_text_enum(row.get::<_, String>(8)?)?,
        attempts: row.get::<_, i64>(9)? as u32,
        max_attempts: row.get::<_, i64>(10)? as u32,
        not_before: row.get(11)?,
        locked_until: row.get(12)?,
        last_error: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

const JOB_COLUMNS: &str = "id, tenant_id, account_id, recipient, payload, kind, batch_id, \
     message_id, status, attempts, max_attempts, not_before, locked_until, last_error, \
     created_at, updated_at";

/// Enqueue a new job. Returns the auto-generated job id.
pub async fn enqueue(db: &Database, job: &NewJob) -> Result<i64, WaylinkError> {
    let j = job.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO dispatch_jobs (tenant_id, account_id, recipient, payload, kind, \
                 batch_id, message_id, max_attempts, not_before) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    j.tenant_id,
                    j.account_id,
                    j.recipient,
                    j.payload,
                    j.kind.to_string(),
                    j.batch_id,
                    j.message_id,
                    j.max_attempts as i64,
                    j.not_before
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Claim the oldest due pending job, if any.
///
/// Atomically selects the oldest pending entry whose `not_before` has
/// passed and marks it `running` with a 5-minute lock timeout.
pub async fn claim_due(db: &Database, now: &str) -> Result<Option<DispatchJob>, WaylinkError> {
    let now = now.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            let result = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {JOB_COLUMNS} FROM dispatch_jobs \
                     WHERE status = 'pending' AND not_before <= ?1 \
                     ORDER BY not_before ASC, id ASC LIMIT 1"
                ))?;
                stmt.query_row(params![now], row_to_job).optional()?
            };

            match result {
                Some(job) => {
                    tx.execute(
                        "UPDATE dispatch_jobs SET status = 'running',
                             locked_until = strftime('%Y-%m-%dT%H:%M:%fZ', 'now', '+5 minutes'),
                             updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                         WHERE id = ?1",
                        params![job.id],
                    )?;
                    tx.commit()?;
                    Ok(Some(DispatchJob {
                        status: waylink_core::types::JobStatus::Running,
                        ..job
                    }))
                }
                None => {
                    tx.commit()?;
                    Ok(None)
                }
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Mark a job delivered to the gateway.
pub async fn mark_delivered(db: &Database, id: i64) -> Result<(), WaylinkError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE dispatch_jobs SET status = 'delivered', locked_until = NULL,
                     updated_at = ?2
                 WHERE id = ?1",
                params![id, now_iso()],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Record a transient failure and reschedule: the job returns to `pending`
/// with the given attempt count and backoff-derived `not_before`.
pub async fn mark_retry(
    db: &Database,
    id: i64,
    attempts: u32,
    error: &str,
    not_before: &str,
) -> Result<(), WaylinkError> {
    let error = error.to_string();
    let not_before = not_before.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE dispatch_jobs SET status = 'pending', attempts = ?2,
                     last_error = ?3, not_before = ?4, locked_until = NULL, updated_at = ?5
                 WHERE id = ?1",
                params![id, attempts as i64, error, not_before, now_iso()],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Move a job to the terminal dead-letter state.
pub async fn mark_dead_lettered(
    db: &Database,
    id: i64,
    attempts: u32,
    error: &str,
) -> Result<(), WaylinkError> {
    let error = error.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE dispatch_jobs SET status = 'dead_lettered', attempts = ?2,
                     last_error = ?3, locked_until = NULL, updated_at = ?4
                 WHERE id = ?1",
                params![id, attempts as i64, error, now_iso()],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Re-enqueue all dead-lettered jobs for a tenant with reset attempt
/// counters. Returns the number of jobs revived.
pub async fn retry_dead_lettered(db: &Database, tenant_id: &str) -> Result<u64, WaylinkError> {
    let tenant_id = tenant_id.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE dispatch_jobs SET status = 'pending', attempts = 0,
                     not_before = ?2, last_error = NULL, updated_at = ?2
                 WHERE tenant_id = ?1 AND status = 'dead_lettered'",
                params![tenant_id, now_iso()],
            )?;
            Ok(changed as u64)
        })
        .await
        .map_err(map_tr_err)
}

/// Withdraw a job that has not been claimed yet. Returns `false` when the
/// job is already running or terminal.
pub async fn cancel_pending(db: &Database, id: i64) -> Result<bool, WaylinkError> {
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "DELETE FROM dispatch_jobs WHERE id = ?1 AND status = 'pending'",
                params![id],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Return `running` jobs whose lock expired to `pending`. Crash recovery;
/// called at startup before workers spawn.
pub async fn release_expired_locks(db: &Database, now: &str) -> Result<u64, WaylinkError> {
    let now = now.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE dispatch_jobs SET status = 'pending', locked_until = NULL,
                     updated_at = ?1
                 WHERE status = 'running' AND locked_until IS NOT NULL AND locked_until < ?1",
                params![now],
            )?;
            Ok(changed as u64)
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch a job by id.
pub async fn get(db: &Database, id: i64) -> Result<Option<DispatchJob>, WaylinkError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {JOB_COLUMNS} FROM dispatch_jobs WHERE id = ?1"),
                params![id],
                row_to_job,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Per-status counts for a tenant's jobs.
pub async fn counts_for_tenant(
    db: &Database,
    tenant_id: &str,
) -> Result<QueueCounts, WaylinkError> {
    let tenant_id = tenant_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT status, COUNT(*) FROM dispatch_jobs WHERE tenant_id = ?1 \
                 GROUP BY status",
            )?;
            let mut counts = QueueCounts::default();
            let rows = stmt.query_map(params![tenant_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (status, count) = row?;
                let count = count as u64;
                match status.as_str() {
                    "pending" => counts.pending = count,
                    "running" => counts.running = count,
                    "delivered" => counts.delivered = count,
                    "dead_lettered" => counts.dead_lettered = count,
                    _ => {}
                }
            }
            Ok(counts)
        })
        .await
        .map_err(map_tr_err)
}
