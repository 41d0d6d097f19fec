// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dispatch workers: claim due jobs, resolve credentials, execute against
//! the gateway, and drive retry/dead-letter accounting.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use waylink_config::model::DispatchConfig;
use waylink_core::types::DeliveryStatus;
use waylink_core::{GatewayApi, WaylinkError};
use waylink_storage::queries::{accounts, jobs, messages};
use waylink_storage::{now_iso, Database, DispatchJob};

use crate::backoff::backoff_delay_jittered;
use crate::ratelimit::TenantRateLimiter;

/// Outcome of one job execution, for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Delivered,
    Retrying { attempt: u32 },
    DeadLettered,
}

/// Execute one claimed job to its next state.
///
/// The account's gateway credential resolves here, at execution time, so
/// credential rotation or an account turning `failed` is honored. A job
/// for an account lacking a usable credential dead-letters immediately
/// without consuming a retry.
pub async fn execute_job(
    db: &Database,
    gateway: &Arc<dyn GatewayApi>,
    config: &DispatchConfig,
    job: &DispatchJob,
) -> Result<JobOutcome, WaylinkError> {
    let account = accounts::get(db, &job.account_id)
        .await?
        .filter(|a| a.deleted_at.is_none());

    let Some(token) = account.as_ref().and_then(|a| a.instance_token.clone()) else {
        let error = WaylinkError::MissingCredential {
            account: job.account_id.clone(),
        };
        warn!(job = job.id, account = %job.account_id, "job dead-lettered: no usable credential");
        jobs::mark_dead_lettered(db, job.id, job.attempts, &error.to_string()).await?;
        fail_originating_message(db, job, &error.to_string()).await?;
        return Ok(JobOutcome::DeadLettered);
    };
    let instance_key = account
        .map(|a| a.instance_key)
        .unwrap_or_else(|| job.account_id.clone());

    match gateway
        .send_text(&instance_key, &token, &job.recipient, &job.payload)
        .await
    {
        Ok(gateway_message_id) => {
            jobs::mark_delivered(db, job.id).await?;
            if let Some(message_id) = &job.message_id {
                messages::set_delivery_status(db, message_id, DeliveryStatus::Sent, None).await?;
            }
            debug!(
                job = job.id,
                gateway_message_id = %gateway_message_id,
                "job delivered to gateway"
            );
            Ok(JobOutcome::Delivered)
        }
        Err(e) => {
            let attempt = job.attempts + 1;
            if e.is_transient() && attempt < job.max_attempts {
                let delay = backoff_delay_jittered(config, attempt);
                let not_before = (Utc::now()
                    + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero()))
                .format("%Y-%m-%dT%H:%M:%S%.3fZ")
                .to_string();
                warn!(
                    job = job.id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient dispatch failure, retrying with backoff"
                );
                jobs::mark_retry(db, job.id, attempt, &e.to_string(), &not_before).await?;
                Ok(JobOutcome::Retrying { attempt })
            } else {
                warn!(
                    job = job.id,
                    attempt,
                    transient = e.is_transient(),
                    error = %e,
                    "dispatch failure, dead-lettering"
                );
                jobs::mark_dead_lettered(db, job.id, attempt, &e.to_string()).await?;
                fail_originating_message(db, job, &e.to_string()).await?;
                Ok(JobOutcome::DeadLettered)
            }
        }
    }
}

/// Reflect a dead-lettered job onto its originating message so the
/// sender-facing layer shows "failed" rather than a silent pending.
async fn fail_originating_message(
    db: &Database,
    job: &DispatchJob,
    error: &str,
) -> Result<(), WaylinkError> {
    if let Some(message_id) = &job.message_id {
        messages::set_delivery_status(db, message_id, DeliveryStatus::Failed, Some(error)).await?;
    }
    Ok(())
}

/// Spawn `config.workers` worker tasks pulling from the queue.
///
/// Each worker claims the oldest due job, waits for the tenant's rate
/// slot, executes, and repeats. Cancelling the token stops the workers
/// after their in-flight job.
pub fn spawn_workers(
    db: Database,
    gateway: Arc<dyn GatewayApi>,
    config: DispatchConfig,
    limiter: Arc<TenantRateLimiter>,
    shutdown: CancellationToken,
) -> Vec<JoinHandle<()>> {
    let count = config.workers;
    (0..count)
        .map(|worker_id| {
            let db = db.clone();
            let gateway = gateway.clone();
            let config = config.clone();
            let limiter = limiter.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                info!(worker_id, "dispatch worker started");
                let idle = Duration::from_millis(config.claim_interval_ms);
                loop {
                    if shutdown.is_cancelled() {
                        debug!(worker_id, "dispatch worker stopped");
                        return;
                    }

                    let claimed = match jobs::claim_due(&db, &now_iso()).await {
                        Ok(claimed) => claimed,
                        Err(e) => {
                            warn!(worker_id, error = %e, "claiming job failed");
                            None
                        }
                    };

                    match claimed {
                        Some(job) => {
                            // Rate limit at execution time; over-limit jobs
                            // wait, they never fail.
                            limiter.acquire(&job.tenant_id).await;
                            if let Err(e) = execute_job(&db, &gateway, &config, &job).await {
                                warn!(worker_id, job = job.id, error = %e, "job execution errored");
                            }
                        }
                        None => {
                            tokio::select! {
                                _ = tokio::time::sleep(idle) => {}
                                _ = shutdown.cancelled() => {
                                    debug!(worker_id, "dispatch worker stopped");
                                    return;
                                }
                            }
                        }
                    }
                }
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use waylink_core::types::{ConnectionState, Direction, JobKind, JobStatus};
    use waylink_storage::queries::accounts::NewAccount;
    use waylink_storage::queries::jobs::NewJob;
    use waylink_storage::queries::{conversations, messages::NewMessage};
    use waylink_test_utils::{MockGateway, SendScript};

    fn test_config() -> DispatchConfig {
        DispatchConfig {
            workers: 2,
            max_attempts: 3,
            backoff_base_ms: 1,
            backoff_cap_ms: 10,
            claim_interval_ms: 5,
            ..DispatchConfig::default()
        }
    }

    async fn setup() -> (Database, Arc<MockGateway>) {
        let db = Database::open_in_memory().await.unwrap();
        accounts::insert(
            &db,
            &NewAccount {
                id: "acc-1".to_string(),
                tenant_id: "tenant-1".to_string(),
                name: "Main".to_string(),
                instance_key: "wa-acc-1".to_string(),
                instance_token: Some("tok".to_string()),
                state: ConnectionState::Connected,
            },
        )
        .await
        .unwrap();
        (db, Arc::new(MockGateway::new()))
    }

    async fn enqueue_with_message(db: &Database, max_attempts: u32) -> (i64, String) {
        let conversation = conversations::get_or_create(db, "acc-1", "15550001111")
            .await
            .unwrap();
        let message_id = uuid::Uuid::new_v4().to_string();
        messages::insert(
            db,
            &NewMessage {
                id: message_id.clone(),
                conversation_id: conversation.id,
                direction: Direction::Outbound,
                content: "hello".to_string(),
                media_url: None,
                media_kind: None,
                delivery_status: DeliveryStatus::Pending,
            },
        )
        .await
        .unwrap();

        let job_id = jobs::enqueue(
            db,
            &NewJob {
                tenant_id: "tenant-1".to_string(),
                account_id: "acc-1".to_string(),
                recipient: "15550001111".to_string(),
                payload: "hello".to_string(),
                kind: JobKind::Single,
                batch_id: None,
                message_id: Some(message_id.clone()),
                max_attempts,
                not_before: "2020-01-01T00:00:00.000Z".to_string(),
            },
        )
        .await
        .unwrap();
        (job_id, message_id)
    }

    async fn claim(db: &Database) -> DispatchJob {
        jobs::claim_due(db, "2099-01-01T00:00:00.000Z")
            .await
            .unwrap()
            .expect("a job should be claimable")
    }

    #[tokio::test]
    async fn success_marks_job_delivered_and_message_sent() {
        let (db, gateway) = setup().await;
        let gateway: Arc<dyn GatewayApi> = gateway;
        let (job_id, message_id) = enqueue_with_message(&db, 3).await;

        let job = claim(&db).await;
        let outcome = execute_job(&db, &gateway, &test_config(), &job)
            .await
            .unwrap();
        assert_eq!(outcome, JobOutcome::Delivered);

        let job = jobs::get(&db, job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Delivered);
        let message = messages::get(&db, &message_id).await.unwrap().unwrap();
        assert_eq!(message.delivery_status, DeliveryStatus::Sent);
    }

    #[tokio::test]
    async fn transient_failures_retry_then_succeed() {
        let (db, mock) = setup().await;
        mock.push_send(SendScript::Transient).await;
        mock.push_send(SendScript::Transient).await;
        // Third attempt succeeds (default Ok).
        let gateway: Arc<dyn GatewayApi> = mock.clone();
        let (job_id, message_id) = enqueue_with_message(&db, 5).await;
        let config = test_config();

        // k = 2 transient failures below the ceiling of 5.
        for expected_attempt in 1..=2 {
            let job = claim(&db).await;
            let outcome = execute_job(&db, &gateway, &config, &job).await.unwrap();
            assert_eq!(
                outcome,
                JobOutcome::Retrying {
                    attempt: expected_attempt
                }
            );
        }

        let job = claim(&db).await;
        let outcome = execute_job(&db, &gateway, &config, &job).await.unwrap();
        assert_eq!(outcome, JobOutcome::Delivered);

        let job = jobs::get(&db, job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Delivered);
        let message = messages::get(&db, &message_id).await.unwrap().unwrap();
        assert_eq!(message.delivery_status, DeliveryStatus::Sent);
        assert_eq!(mock.sends().await.len(), 3);
    }

    #[tokio::test]
    async fn transient_failures_to_ceiling_dead_letter() {
        let (db, mock) = setup().await;
        for _ in 0..3 {
            mock.push_send(SendScript::Transient).await;
        }
        let gateway: Arc<dyn GatewayApi> = mock.clone();
        let (job_id, message_id) = enqueue_with_message(&db, 3).await;
        let config = test_config();

        let job = claim(&db).await;
        assert_eq!(
            execute_job(&db, &gateway, &config, &job).await.unwrap(),
            JobOutcome::Retrying { attempt: 1 }
        );
        let job = claim(&db).await;
        assert_eq!(
            execute_job(&db, &gateway, &config, &job).await.unwrap(),
            JobOutcome::Retrying { attempt: 2 }
        );
        // Attempt 3 reaches the ceiling.
        let job = claim(&db).await;
        assert_eq!(
            execute_job(&db, &gateway, &config, &job).await.unwrap(),
            JobOutcome::DeadLettered
        );

        let job = jobs::get(&db, job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::DeadLettered);
        assert_eq!(job.attempts, 3);
        assert!(job.last_error.is_some());
        let message = messages::get(&db, &message_id).await.unwrap().unwrap();
        assert_eq!(message.delivery_status, DeliveryStatus::Failed);
        assert!(message.delivery_error.is_some());
    }

    #[tokio::test]
    async fn permanent_failure_dead_letters_after_one_attempt() {
        let (db, mock) = setup().await;
        mock.push_send(SendScript::Permanent).await;
        let gateway: Arc<dyn GatewayApi> = mock.clone();
        let (job_id, message_id) = enqueue_with_message(&db, 5).await;

        let job = claim(&db).await;
        let outcome = execute_job(&db, &gateway, &test_config(), &job)
            .await
            .unwrap();
        assert_eq!(outcome, JobOutcome::DeadLettered);

        let job = jobs::get(&db, job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::DeadLettered);
        assert_eq!(job.attempts, 1, "exactly one attempt");
        let message = messages::get(&db, &message_id).await.unwrap().unwrap();
        assert_eq!(message.delivery_status, DeliveryStatus::Failed);
        assert_eq!(mock.sends().await.len(), 1);
    }

    #[tokio::test]
    async fn missing_credential_dead_letters_without_gateway_call() {
        let (db, mock) = setup().await;
        let gateway: Arc<dyn GatewayApi> = mock.clone();
        let (job_id, message_id) = enqueue_with_message(&db, 5).await;

        // Credential disappears between enqueue and execution.
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "UPDATE accounts SET instance_token = NULL WHERE id = 'acc-1'",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        let job = claim(&db).await;
        let outcome = execute_job(&db, &gateway, &test_config(), &job)
            .await
            .unwrap();
        assert_eq!(outcome, JobOutcome::DeadLettered);

        let job = jobs::get(&db, job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::DeadLettered);
        // No retry consumed.
        assert_eq!(job.attempts, 0);
        assert!(job.last_error.as_deref().unwrap().contains("credential"));
        let message = messages::get(&db, &message_id).await.unwrap().unwrap();
        assert_eq!(message.delivery_status, DeliveryStatus::Failed);
        assert!(mock.sends().await.is_empty(), "gateway must not be called");
    }

    #[tokio::test]
    async fn worker_loop_drains_queue_end_to_end() {
        let (db, mock) = setup().await;
        let gateway: Arc<dyn GatewayApi> = mock.clone();
        let config = test_config();
        let limiter = Arc::new(TenantRateLimiter::new(&config));
        let (job_id, message_id) = enqueue_with_message(&db, 3).await;

        let shutdown = CancellationToken::new();
        let handles = spawn_workers(
            db.clone(),
            gateway,
            config,
            limiter,
            shutdown.clone(),
        );

        // Poll until the worker has processed the job.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            let job = jobs::get(&db, job_id).await.unwrap().unwrap();
            if job.status == JobStatus::Delivered {
                break;
            }
            assert!(
                std::time::Instant::now() < deadline,
                "worker did not process the job in time"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        shutdown.cancel();
        for handle in handles {
            handle.await.unwrap();
        }

        let message = messages::get(&db, &message_id).await.unwrap().unwrap();
        assert_eq!(message.delivery_status, DeliveryStatus::Sent);
    }
}
