// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound event pipeline.
//!
//! Authenticated webhook events land here: connection events feed the
//! reconciler, message events are persisted and run through the
//! auto-response policy, and generated replies are handed to the
//! dispatch queue. Errors are logged and contained per event.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};
use waylink_core::types::{DeliveryStatus, Direction};
use waylink_core::WaylinkError;
use waylink_autoreply::{should_respond, AutoReplyEngine, GeneratedReply};
use waylink_dispatch::DispatchQueue;
use waylink_reconciler::Reconciler;
use waylink_storage::queries::{accounts, conversations, messages, policies};
use waylink_storage::queries::messages::NewMessage;
use waylink_storage::{Account, AutomationRecord, Database};
use waylink_webhook::event::MessageUpsertData;
use waylink_webhook::{EventKind, EventSink, WebhookEnvelope};

/// Routes authenticated webhook events into the integration core.
pub struct InboundPipeline {
    db: Database,
    reconciler: Arc<Reconciler>,
    engine: Arc<AutoReplyEngine>,
    queue: DispatchQueue,
}

impl InboundPipeline {
    pub fn new(
        db: Database,
        reconciler: Arc<Reconciler>,
        engine: Arc<AutoReplyEngine>,
        queue: DispatchQueue,
    ) -> Self {
        Self {
            db,
            reconciler,
            engine,
            queue,
        }
    }

    async fn handle_message_upsert(&self, envelope: &WebhookEnvelope) -> Result<(), WaylinkError> {
        let data: MessageUpsertData = envelope.parse_data().map_err(|e| {
            WaylinkError::Internal(format!("malformed messages.upsert payload: {e}"))
        })?;

        let Some(account) =
            accounts::get_by_instance_key(&self.db, &envelope.instance).await?
        else {
            debug!(instance = %envelope.instance, "message for unknown account ignored");
            return Ok(());
        };

        // The gateway delivers at-least-once; a replayed message id is a
        // duplicate, not new traffic.
        if messages::get(&self.db, &data.key.id).await?.is_some() {
            debug!(message = %data.key.id, "duplicate message delivery ignored");
            return Ok(());
        }

        let conversation =
            conversations::get_or_create(&self.db, &account.id, data.counterpart()).await?;
        let text = data.text().unwrap_or_default().to_string();

        if data.key.from_me {
            // Echo of a send made from the phone itself: record, no
            // unread bump, no automation.
            messages::insert(
                &self.db,
                &NewMessage {
                    id: data.key.id.clone(),
                    conversation_id: conversation.id.clone(),
                    direction: Direction::Outbound,
                    content: text,
                    media_url: None,
                    media_kind: None,
                    delivery_status: DeliveryStatus::Sent,
                },
            )
            .await?;
            conversations::touch(&self.db, &conversation.id, false).await?;
            return Ok(());
        }

        messages::insert(
            &self.db,
            &NewMessage {
                id: data.key.id.clone(),
                conversation_id: conversation.id.clone(),
                direction: Direction::Inbound,
                content: text.clone(),
                media_url: None,
                media_kind: None,
                delivery_status: DeliveryStatus::Delivered,
            },
        )
        .await?;
        conversations::touch(&self.db, &conversation.id, true).await?;

        if text.is_empty() {
            // Media-only message: nothing for the policy to match on.
            return Ok(());
        }

        self.maybe_auto_reply(&account, &conversation.id, &data.counterpart().to_string(), &text)
            .await
    }

    /// Run the policy decision and, when it fires, generate and enqueue
    /// the reply. Quota declines are logged distinctly from failures.
    async fn maybe_auto_reply(
        &self,
        account: &Account,
        conversation_id: &str,
        recipient: &str,
        text: &str,
    ) -> Result<(), WaylinkError> {
        let policy = policies::get_or_default(&self.db, &account.tenant_id).await?;
        if !should_respond(&policy, text, Utc::now()) {
            return Ok(());
        }

        let generated = match self
            .engine
            .generate_reply(&account.tenant_id, conversation_id)
            .await
        {
            Ok(Some(generated)) => generated,
            Ok(None) => return Ok(()),
            Err(WaylinkError::QuotaExceeded { message }) => {
                info!(
                    tenant = %account.tenant_id,
                    conversation = conversation_id,
                    reason = %message,
                    "auto-reply skipped: quota exceeded"
                );
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        self.enqueue_reply(account, conversation_id, recipient, generated)
            .await
    }

    async fn enqueue_reply(
        &self,
        account: &Account,
        conversation_id: &str,
        recipient: &str,
        generated: GeneratedReply,
    ) -> Result<(), WaylinkError> {
        let message_id = uuid::Uuid::new_v4().to_string();
        messages::insert(
            &self.db,
            &NewMessage {
                id: message_id.clone(),
                conversation_id: conversation_id.to_string(),
                direction: Direction::Outbound,
                content: generated.text.clone(),
                media_url: None,
                media_kind: None,
                delivery_status: DeliveryStatus::Pending,
            },
        )
        .await?;
        messages::attach_automation(
            &self.db,
            &message_id,
            &AutomationRecord {
                model: generated.model.clone(),
                tokens: generated.tokens_used,
                prompt_hash: generated.prompt_hash.clone(),
            },
        )
        .await?;
        conversations::touch(&self.db, conversation_id, false).await?;

        if generated.delay.is_zero() {
            self.queue
                .enqueue_single(
                    &account.tenant_id,
                    &account.id,
                    recipient,
                    &generated.text,
                    Some(message_id),
                )
                .await?;
        } else {
            let send_at = Utc::now()
                + chrono::Duration::from_std(generated.delay)
                    .unwrap_or_else(|_| chrono::Duration::zero());
            self.queue
                .enqueue_scheduled(
                    &account.tenant_id,
                    &account.id,
                    recipient,
                    &generated.text,
                    send_at,
                    Some(message_id),
                )
                .await?;
        }

        debug!(
            tenant = %account.tenant_id,
            conversation = conversation_id,
            "auto-reply enqueued"
        );
        Ok(())
    }
}

#[async_trait]
impl EventSink for InboundPipeline {
    async fn handle_event(&self, envelope: WebhookEnvelope) -> Result<(), WaylinkError> {
        match envelope.kind() {
            EventKind::ConnectionUpdate | EventKind::PairingUpdate => {
                self.reconciler.apply_webhook_event(&envelope).await
            }
            EventKind::MessageUpsert => self.handle_message_upsert(&envelope).await,
            EventKind::Other => {
                debug!(event = %envelope.event, "unrecognized event kind ignored");
                Ok(())
            }
        }
    }
}
