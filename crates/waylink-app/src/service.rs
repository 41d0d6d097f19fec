// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The application-facing service facade.
//!
//! The only surface the dashboard/CRUD layer touches: account lifecycle,
//! sends, auto-reply policy management, usage statistics, dead-letter
//! retry, and queue/rate snapshots.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use waylink_config::model::WaylinkConfig;
use waylink_core::types::{ConnectionState, DeliveryStatus, Direction};
use waylink_core::{GatewayApi, WaylinkError};
use waylink_dispatch::{DispatchQueue, RateSnapshot, TenantRateLimiter};
use waylink_reconciler::{ConnectOutcome, Reconciler};
use waylink_storage::queries::jobs::QueueCounts;
use waylink_storage::queries::messages::NewMessage;
use waylink_storage::queries::{accounts, conversations, messages, policies};
use waylink_storage::{Account, AutoReplyPolicy, Database, PolicyLimits, UsageCounters};

/// Usage statistics for a tenant's auto-reply policy.
#[derive(Debug, Clone)]
pub struct UsageStats {
    pub usage: UsageCounters,
    pub limits: PolicyLimits,
}

/// Application-facing operations over the integration core.
pub struct AppService {
    db: Database,
    gateway: Arc<dyn GatewayApi>,
    reconciler: Arc<Reconciler>,
    queue: DispatchQueue,
    limiter: Arc<TenantRateLimiter>,
    webhook_base_url: String,
}

impl AppService {
    pub fn new(
        db: Database,
        gateway: Arc<dyn GatewayApi>,
        reconciler: Arc<Reconciler>,
        queue: DispatchQueue,
        limiter: Arc<TenantRateLimiter>,
        config: &WaylinkConfig,
    ) -> Self {
        Self {
            db,
            gateway,
            reconciler,
            queue,
            limiter,
            webhook_base_url: config.gateway.webhook_base_url.trim_end_matches('/').to_string(),
        }
    }

    // --- Accounts ---

    /// Create an account and provision its gateway instance.
    ///
    /// The local row persists even when gateway provisioning fails (state
    /// `failed`, no credential), to avoid silent loss; such an account
    /// must be deleted and recreated.
    pub async fn create_account(
        &self,
        tenant_id: &str,
        name: &str,
    ) -> Result<Account, WaylinkError> {
        let id = uuid::Uuid::new_v4().to_string();
        let instance_key = format!("wa-{}", &id[..8]);
        let webhook_url = format!("{}/webhook/{instance_key}", self.webhook_base_url);

        let (token, state) = match self
            .gateway
            .create_instance(&instance_key, &webhook_url)
            .await
        {
            Ok(provisioned) => (Some(provisioned.token), ConnectionState::Disconnected),
            Err(e) => {
                warn!(
                    tenant = tenant_id,
                    instance = %instance_key,
                    error = %e,
                    "gateway provisioning failed; keeping local account as failed"
                );
                (None, ConnectionState::Failed)
            }
        };

        accounts::insert(
            &self.db,
            &accounts::NewAccount {
                id: id.clone(),
                tenant_id: tenant_id.to_string(),
                name: name.to_string(),
                instance_key,
                instance_token: token,
                state,
            },
        )
        .await?;

        info!(tenant = tenant_id, account = %id, state = %state, "account created");
        accounts::get(&self.db, &id)
            .await?
            .ok_or_else(|| WaylinkError::Internal("account vanished after insert".to_string()))
    }

    pub async fn list_accounts(&self, tenant_id: &str) -> Result<Vec<Account>, WaylinkError> {
        accounts::list_for_tenant(&self.db, tenant_id).await
    }

    pub async fn get_account(&self, account_id: &str) -> Result<Option<Account>, WaylinkError> {
        accounts::get(&self.db, account_id).await
    }

    /// Start (or refresh) pairing for an account.
    pub async fn connect_account(
        &self,
        account_id: &str,
    ) -> Result<ConnectOutcome, WaylinkError> {
        self.reconciler.request_connection(account_id).await
    }

    /// Log the account out of WhatsApp. Gateway logout is best-effort;
    /// local state becomes `disconnected` regardless.
    pub async fn disconnect_account(&self, account_id: &str) -> Result<(), WaylinkError> {
        let account = accounts::get(&self.db, account_id)
            .await?
            .ok_or_else(|| WaylinkError::Internal(format!("unknown account {account_id}")))?;

        if let Some(token) = account.instance_token.as_deref() {
            if let Err(e) = self.gateway.disconnect(&account.instance_key, token).await {
                warn!(account = account_id, error = %e, "gateway logout failed, disconnecting locally");
            }
        }
        accounts::mark_disconnected(&self.db, account_id).await?;
        info!(account = account_id, "account disconnected");
        Ok(())
    }

    /// Soft-delete an account and best-effort delete its gateway instance.
    pub async fn delete_account(&self, account_id: &str) -> Result<(), WaylinkError> {
        let account = accounts::get(&self.db, account_id)
            .await?
            .ok_or_else(|| WaylinkError::Internal(format!("unknown account {account_id}")))?;

        accounts::soft_delete(&self.db, account_id).await?;
        if let Err(e) = self.gateway.delete_instance(&account.instance_key).await {
            warn!(account = account_id, error = %e, "gateway-side delete failed; local row is soft-deleted");
        }
        info!(account = account_id, "account deleted");
        Ok(())
    }

    // --- Sends ---

    /// Send a single message now. Returns (job id, message id).
    pub async fn send_single(
        &self,
        account_id: &str,
        recipient: &str,
        text: &str,
    ) -> Result<(i64, String), WaylinkError> {
        let account = self.live_account(account_id).await?;
        let message_id = self
            .record_outbound(&account, recipient, text)
            .await?;
        let job_id = self
            .queue
            .enqueue_single(
                &account.tenant_id,
                &account.id,
                recipient,
                text,
                Some(message_id.clone()),
            )
            .await?;
        Ok((job_id, message_id))
    }

    /// Send to many recipients with a fixed delay between them. Returns
    /// the job ids in recipient order.
    pub async fn send_bulk(
        &self,
        account_id: &str,
        recipients: &[String],
        text: &str,
        delay_between: Duration,
    ) -> Result<Vec<i64>, WaylinkError> {
        let account = self.live_account(account_id).await?;
        self.queue
            .enqueue_bulk(&account.tenant_id, &account.id, recipients, text, delay_between)
            .await
    }

    /// Schedule a single message for a future instant.
    pub async fn send_scheduled(
        &self,
        account_id: &str,
        recipient: &str,
        text: &str,
        send_at: DateTime<Utc>,
    ) -> Result<(i64, String), WaylinkError> {
        let account = self.live_account(account_id).await?;
        let message_id = self
            .record_outbound(&account, recipient, text)
            .await?;
        let job_id = self
            .queue
            .enqueue_scheduled(
                &account.tenant_id,
                &account.id,
                recipient,
                text,
                send_at,
                Some(message_id.clone()),
            )
            .await?;
        Ok((job_id, message_id))
    }

    /// Withdraw a scheduled job that has not been claimed yet.
    pub async fn cancel_job(&self, job_id: i64) -> Result<bool, WaylinkError> {
        self.queue.cancel(job_id).await
    }

    // --- Auto-reply policy ---

    pub async fn get_policy(&self, tenant_id: &str) -> Result<AutoReplyPolicy, WaylinkError> {
        policies::get_or_default(&self.db, tenant_id).await
    }

    pub async fn update_policy(&self, policy: &AutoReplyPolicy) -> Result<(), WaylinkError> {
        policies::upsert(&self.db, policy).await
    }

    pub async fn toggle_policy(
        &self,
        tenant_id: &str,
        enabled: bool,
    ) -> Result<(), WaylinkError> {
        // Ensure a row exists so the toggle has something to hit.
        let policy = policies::get_or_default(&self.db, tenant_id).await?;
        policies::upsert(&self.db, &policy).await?;
        policies::set_enabled(&self.db, tenant_id, enabled).await
    }

    pub async fn usage_stats(&self, tenant_id: &str) -> Result<UsageStats, WaylinkError> {
        let policy = policies::get_or_default(&self.db, tenant_id).await?;
        Ok(UsageStats {
            usage: policy.usage,
            limits: policy.limits,
        })
    }

    // --- Queue operations ---

    /// Re-enqueue all dead-lettered jobs for a tenant.
    pub async fn retry_failed(&self, tenant_id: &str) -> Result<u64, WaylinkError> {
        self.queue.retry_failed(tenant_id).await
    }

    pub async fn queue_snapshot(&self, tenant_id: &str) -> Result<QueueCounts, WaylinkError> {
        self.queue.counts(tenant_id).await
    }

    pub async fn rate_snapshot(&self, tenant_id: &str) -> RateSnapshot {
        self.limiter.snapshot(tenant_id).await
    }

    // --- Helpers ---

    async fn live_account(&self, account_id: &str) -> Result<Account, WaylinkError> {
        accounts::get(&self.db, account_id)
            .await?
            .filter(|a| a.deleted_at.is_none())
            .ok_or_else(|| WaylinkError::Internal(format!("unknown account {account_id}")))
    }

    async fn record_outbound(
        &self,
        account: &Account,
        recipient: &str,
        text: &str,
    ) -> Result<String, WaylinkError> {
        let conversation =
            conversations::get_or_create(&self.db, &account.id, recipient).await?;
        let message_id = uuid::Uuid::new_v4().to_string();
        messages::insert(
            &self.db,
            &NewMessage {
                id: message_id.clone(),
                conversation_id: conversation.id.clone(),
                direction: Direction::Outbound,
                content: text.to_string(),
                media_url: None,
                media_kind: None,
                delivery_status: DeliveryStatus::Pending,
            },
        )
        .await?;
        conversations::touch(&self.db, &conversation.id, false).await?;
        Ok(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waylink_config::model::{DispatchConfig, ReconcilerConfig};
    use waylink_core::types::{JobStatus, ReplyMode};
    use waylink_storage::queries::jobs;
    use waylink_test_utils::{MockGateway, StateScript};
    use waylink_core::types::WireState;

    async fn setup() -> (AppService, Database, Arc<MockGateway>) {
        let db = Database::open_in_memory().await.unwrap();
        let mock = Arc::new(MockGateway::new());
        let gateway: Arc<dyn GatewayApi> = mock.clone();
        let config = WaylinkConfig::default();
        let reconciler = Arc::new(Reconciler::new(
            db.clone(),
            gateway.clone(),
            ReconcilerConfig::default(),
        ));
        let queue = DispatchQueue::new(db.clone(), DispatchConfig::default());
        let limiter = Arc::new(TenantRateLimiter::new(&DispatchConfig::default()));
        let service = AppService::new(db.clone(), gateway, reconciler, queue, limiter, &config);
        (service, db, mock)
    }

    #[tokio::test]
    async fn create_account_provisions_and_persists() {
        let (service, _db, _mock) = setup().await;
        let account = service.create_account("tenant-1", "Support").await.unwrap();

        assert_eq!(account.tenant_id, "tenant-1");
        assert_eq!(account.state, ConnectionState::Disconnected);
        assert!(account.instance_token.is_some());
        assert!(account.instance_key.starts_with("wa-"));

        let listed = service.list_accounts("tenant-1").await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn connect_account_flows_through_reconciler() {
        let (service, _db, mock) = setup().await;
        let account = service.create_account("tenant-1", "Support").await.unwrap();
        mock.push_state(&account.instance_key, StateScript::State(WireState::Close, None))
            .await;

        let outcome = service.connect_account(&account.id).await.unwrap();
        assert!(matches!(outcome, ConnectOutcome::Pairing(_)));

        let refreshed = service.get_account(&account.id).await.unwrap().unwrap();
        assert_eq!(refreshed.state, ConnectionState::Connecting);
    }

    #[tokio::test]
    async fn disconnect_and_delete_are_best_effort_on_gateway() {
        let (service, _db, mock) = setup().await;
        let account = service.create_account("tenant-1", "Support").await.unwrap();

        service.disconnect_account(&account.id).await.unwrap();
        let refreshed = service.get_account(&account.id).await.unwrap().unwrap();
        assert_eq!(refreshed.state, ConnectionState::Disconnected);
        assert_eq!(mock.disconnected().await, vec![account.instance_key.clone()]);

        service.delete_account(&account.id).await.unwrap();
        assert!(service.list_accounts("tenant-1").await.unwrap().is_empty());
        assert_eq!(mock.deleted().await, vec![account.instance_key.clone()]);
    }

    #[tokio::test]
    async fn send_single_creates_message_and_job() {
        let (service, db, _mock) = setup().await;
        let account = service.create_account("tenant-1", "Support").await.unwrap();

        let (job_id, message_id) = service
            .send_single(&account.id, "15550001111", "hi there")
            .await
            .unwrap();

        let job = jobs::get(&db, job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.message_id.as_deref(), Some(message_id.as_str()));
        assert_eq!(job.tenant_id, "tenant-1");

        let message = messages::get(&db, &message_id).await.unwrap().unwrap();
        assert_eq!(message.delivery_status, DeliveryStatus::Pending);
    }

    #[tokio::test]
    async fn send_bulk_returns_one_job_per_recipient() {
        let (service, db, _mock) = setup().await;
        let account = service.create_account("tenant-1", "Support").await.unwrap();

        let recipients: Vec<String> =
            (0..3).map(|i| format!("1555000{i:04}")).collect();
        let ids = service
            .send_bulk(&account.id, &recipients, "promo", Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(ids.len(), 3);

        let counts = jobs::counts_for_tenant(&db, "tenant-1").await.unwrap();
        assert_eq!(counts.pending, 3);
    }

    #[tokio::test]
    async fn scheduled_send_can_be_cancelled_before_claim() {
        let (service, _db, _mock) = setup().await;
        let account = service.create_account("tenant-1", "Support").await.unwrap();

        let (job_id, _message_id) = service
            .send_scheduled(
                &account.id,
                "15550001111",
                "tomorrow",
                Utc::now() + chrono::Duration::hours(24),
            )
            .await
            .unwrap();

        assert!(service.cancel_job(job_id).await.unwrap());
        assert!(!service.cancel_job(job_id).await.unwrap());
    }

    #[tokio::test]
    async fn policy_round_trip_and_toggle() {
        let (service, _db, _mock) = setup().await;

        let mut policy = service.get_policy("tenant-1").await.unwrap();
        assert!(!policy.enabled);

        policy.enabled = true;
        policy.mode = ReplyMode::Keywords;
        policy.keywords = vec!["refund".to_string()];
        service.update_policy(&policy).await.unwrap();

        let stored = service.get_policy("tenant-1").await.unwrap();
        assert!(stored.enabled);
        assert_eq!(stored.mode, ReplyMode::Keywords);

        service.toggle_policy("tenant-1", false).await.unwrap();
        assert!(!service.get_policy("tenant-1").await.unwrap().enabled);
    }

    #[tokio::test]
    async fn toggle_creates_missing_policy_row() {
        let (service, _db, _mock) = setup().await;
        service.toggle_policy("fresh-tenant", true).await.unwrap();
        assert!(service.get_policy("fresh-tenant").await.unwrap().enabled);
    }

    #[tokio::test]
    async fn snapshots_report_queue_and_rate_state() {
        let (service, _db, _mock) = setup().await;
        let account = service.create_account("tenant-1", "Support").await.unwrap();
        service
            .send_single(&account.id, "15550001111", "hi")
            .await
            .unwrap();

        let queue = service.queue_snapshot("tenant-1").await.unwrap();
        assert_eq!(queue.pending, 1);

        let rate = service.rate_snapshot("tenant-1").await;
        assert_eq!(rate.per_minute, DispatchConfig::default().rate_per_minute);
        assert_eq!(rate.minute_remaining, rate.per_minute);
    }

    #[tokio::test]
    async fn usage_stats_expose_counters_and_limits() {
        let (service, _db, _mock) = setup().await;
        let mut policy = service.get_policy("tenant-1").await.unwrap();
        policy.limits.daily_token_limit = Some(5_000);
        policy.usage.tokens_today = 123;
        service.update_policy(&policy).await.unwrap();

        let stats = service.usage_stats("tenant-1").await.unwrap();
        assert_eq!(stats.usage.tokens_today, 123);
        assert_eq!(stats.limits.daily_token_limit, Some(5_000));
    }
}
