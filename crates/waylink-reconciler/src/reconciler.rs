// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection reconciliation: make local account state converge on
//! gateway truth despite missed webhooks, gateway restarts, or manual
//! out-of-band changes.
//!
//! Poll results and webhook events feed the same merge
//! ([`accounts::apply_observation`]), so either source can independently
//! drive the state machine to convergence.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tracing::{debug, info, warn};
use waylink_config::model::ReconcilerConfig;
use waylink_core::types::{ConnectionState, PairingPayload, StateSource, WireState};
use waylink_core::{GatewayApi, WaylinkError};
use waylink_storage::queries::accounts::{self, StateObservation};
use waylink_storage::{now_iso, Account, Database};
use waylink_webhook::event::{ConnectionUpdateData, PairingUpdateData};
use waylink_webhook::{EventKind, WebhookEnvelope};

/// Result of an explicit connect request.
#[derive(Debug, Clone)]
pub enum ConnectOutcome {
    /// The gateway already reports the account as paired and online.
    AlreadyConnected,
    /// Pairing started (or refreshed); the payload is stored and returned.
    Pairing(PairingPayload),
}

/// Drives account connection state toward the gateway's reported truth.
pub struct Reconciler {
    db: Database,
    gateway: Arc<dyn GatewayApi>,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(db: Database, gateway: Arc<dyn GatewayApi>, config: ReconcilerConfig) -> Self {
        Self {
            db,
            gateway,
            config,
        }
    }

    /// Explicitly (re)start pairing for an account.
    ///
    /// If the gateway reports the instance as `open`, the account goes
    /// straight to `connected` and no pairing payload is requested.
    /// Fails with [`WaylinkError::GatewayUnavailable`] when the gateway no
    /// longer knows the instance; the caller must recreate the account.
    pub async fn request_connection(
        &self,
        account_id: &str,
    ) -> Result<ConnectOutcome, WaylinkError> {
        let account = accounts::get(&self.db, account_id)
            .await?
            .filter(|a| a.deleted_at.is_none())
            .ok_or_else(|| WaylinkError::Internal(format!("unknown account {account_id}")))?;

        let token = account.instance_token.as_deref().ok_or_else(|| {
            WaylinkError::MissingCredential {
                account: account.id.clone(),
            }
        })?;

        let view = self
            .gateway
            .connection_state(&account.instance_key, token)
            .await?;

        if view.state == WireState::Open {
            accounts::mark_connected(&self.db, account_id, view.phone_number.as_deref()).await?;
            info!(account = account_id, "connect request: already connected");
            return Ok(ConnectOutcome::AlreadyConnected);
        }

        let payload = self
            .gateway
            .pairing_payload(&account.instance_key, token)
            .await?;
        if let Some(value) = payload.display_value() {
            accounts::set_pairing(&self.db, account_id, value).await?;
        }
        info!(account = account_id, "connect request: pairing started");
        Ok(ConnectOutcome::Pairing(payload))
    }

    /// One poll cycle over all pollable accounts, with bounded concurrency
    /// and a soft deadline. Errors are contained per account; the cycle
    /// itself never fails.
    pub async fn poll_all(&self) {
        let accounts = match accounts::list_pollable(&self.db).await {
            Ok(accounts) => accounts,
            Err(e) => {
                warn!(error = %e, "poll cycle: listing accounts failed");
                return;
            }
        };

        let now = Utc::now();
        let due: Vec<Account> = accounts
            .into_iter()
            .filter(|account| {
                if self.webhook_seen_recently(account, now) {
                    debug!(account = %account.id, "poll skipped: recent webhook observation");
                    false
                } else {
                    true
                }
            })
            .collect();

        if due.is_empty() {
            return;
        }

        let total = due.len();
        let deadline = std::time::Duration::from_secs(self.config.cycle_deadline_secs);
        let concurrency = self.config.poll_concurrency;

        let cycle = futures::stream::iter(due.into_iter().map(|account| async move {
            self.reconcile_account(&account).await;
        }));

        let result = tokio::time::timeout(
            deadline,
            futures::StreamExt::for_each_concurrent(cycle, concurrency, |fut| fut),
        )
        .await;

        match result {
            Ok(()) => debug!(accounts = total, "poll cycle complete"),
            Err(_) => warn!(
                accounts = total,
                deadline_secs = self.config.cycle_deadline_secs,
                "poll cycle hit soft deadline; remaining accounts wait for next cycle"
            ),
        }
    }

    /// Whether a webhook observation for this account arrived within one
    /// poll interval. Such an account may skip one poll cycle, never
    /// reconciliation entirely.
    fn webhook_seen_recently(&self, account: &Account, now: DateTime<Utc>) -> bool {
        if account.state_source != Some(StateSource::Webhook) {
            return false;
        }
        let Some(observed_at) = account
            .state_observed_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        else {
            return false;
        };
        let age = now.signed_duration_since(observed_at.with_timezone(&Utc));
        age < ChronoDuration::seconds(self.config.poll_interval_secs as i64)
    }

    /// Reconcile one account against the gateway. Contained: logs and
    /// returns on error so other accounts are unaffected.
    pub async fn reconcile_account(&self, account: &Account) {
        let Some(token) = account.instance_token.as_deref() else {
            warn!(account = %account.id, "poll skipped: account has no gateway credential");
            return;
        };

        match self
            .gateway
            .connection_state(&account.instance_key, token)
            .await
        {
            Ok(view) => {
                if let Err(e) = accounts::clear_gateway_misses(&self.db, &account.id).await {
                    warn!(account = %account.id, error = %e, "clearing miss counter failed");
                }
                let observation = StateObservation {
                    state: view.state.to_connection_state(),
                    phone_number: view.phone_number,
                    pairing_code: None,
                    observed_at: now_iso(),
                    source: StateSource::Poll,
                };
                match accounts::apply_observation(&self.db, &account.id, &observation).await {
                    Ok(true) => {
                        if observation.state != account.state {
                            info!(
                                account = %account.id,
                                from = %account.state,
                                to = %observation.state,
                                "poll corrected connection state"
                            );
                        }
                    }
                    Ok(false) => {
                        debug!(account = %account.id, "poll observation was stale, kept stored state");
                    }
                    Err(e) => warn!(account = %account.id, error = %e, "applying poll observation failed"),
                }
            }
            Err(WaylinkError::GatewayUnavailable { message, .. }) => {
                let misses = match accounts::record_gateway_miss(&self.db, &account.id).await {
                    Ok(misses) => misses,
                    Err(e) => {
                        warn!(account = %account.id, error = %e, "recording gateway miss failed");
                        return;
                    }
                };
                if misses >= self.config.orphan_threshold {
                    warn!(
                        account = %account.id,
                        misses,
                        "gateway no longer knows this account; marking orphaned"
                    );
                    if let Err(e) = accounts::mark_orphaned(&self.db, &account.id).await {
                        warn!(account = %account.id, error = %e, "marking orphaned failed");
                    }
                } else {
                    debug!(account = %account.id, misses, detail = %message, "gateway miss recorded");
                }
            }
            Err(e) => {
                // Transient gateway trouble: leave state alone, next cycle
                // retries.
                warn!(account = %account.id, error = %e, "poll query failed");
            }
        }
    }

    /// Apply a connection-relevant webhook event through the same merge as
    /// polling. Non-connection events are ignored here.
    pub async fn apply_webhook_event(&self, envelope: &WebhookEnvelope) -> Result<(), WaylinkError> {
        let Some(account) =
            accounts::get_by_instance_key(&self.db, &envelope.instance).await?
        else {
            debug!(instance = %envelope.instance, "webhook for unknown account ignored");
            return Ok(());
        };

        match envelope.kind() {
            EventKind::ConnectionUpdate => {
                let data: ConnectionUpdateData =
                    envelope.parse_data().map_err(|e| WaylinkError::Internal(
                        format!("malformed connection.update payload: {e}"),
                    ))?;
                let Some(state) = data.state.as_deref() else {
                    return Ok(());
                };
                let state = match state {
                    "open" => ConnectionState::Connected,
                    "connecting" => ConnectionState::Connecting,
                    "close" => ConnectionState::Disconnected,
                    other => {
                        debug!(state = other, "unknown connection state in webhook, ignored");
                        return Ok(());
                    }
                };
                let observation = StateObservation {
                    state,
                    phone_number: None,
                    pairing_code: None,
                    observed_at: now_iso(),
                    source: StateSource::Webhook,
                };
                accounts::apply_observation(&self.db, &account.id, &observation).await?;
                debug!(account = %account.id, state = %state, "webhook connection update applied");
            }
            EventKind::PairingUpdate => {
                let data: PairingUpdateData =
                    envelope.parse_data().map_err(|e| WaylinkError::Internal(
                        format!("malformed qrcode.updated payload: {e}"),
                    ))?;
                let Some(value) = data.qrcode.as_ref().and_then(|q| q.value()) else {
                    return Ok(());
                };
                let observation = StateObservation {
                    state: ConnectionState::Connecting,
                    phone_number: None,
                    pairing_code: Some(value.to_string()),
                    observed_at: now_iso(),
                    source: StateSource::Webhook,
                };
                accounts::apply_observation(&self.db, &account.id, &observation).await?;
                debug!(account = %account.id, "webhook pairing update applied");
            }
            EventKind::MessageUpsert | EventKind::Other => {}
        }

        Ok(())
    }
}
