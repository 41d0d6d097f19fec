// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reply generation: quota gate, context assembly, provider call, usage
//! accounting.
//!
//! Generation is serialized per tenant through a mutex cell, so quota
//! checks and counter updates never interleave for one tenant even under
//! concurrent inbound messages.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use waylink_config::model::AutoReplyConfig;
use waylink_core::types::{ChatMessage, Direction, ReplyRequest};
use waylink_core::{ReplyProvider, WaylinkError};
use waylink_storage::queries::{messages, policies};
use waylink_storage::{AutoReplyPolicy, Database, StoredMessage};

use crate::usage::{check_quota, maybe_reset};

/// A generated reply ready for dispatch.
#[derive(Debug, Clone)]
pub struct GeneratedReply {
    pub text: String,
    /// Model that produced the reply.
    pub model: String,
    /// Token cost recorded against the tenant's counters.
    pub tokens_used: u32,
    /// Fingerprint of the prompt that produced the reply.
    pub prompt_hash: String,
    /// Configured delay before the reply should be dispatched.
    pub delay: Duration,
}

/// Orchestrates auto-reply generation for inbound messages.
pub struct AutoReplyEngine {
    db: Database,
    provider: Arc<dyn ReplyProvider>,
    config: AutoReplyConfig,
    /// One serialization cell per tenant.
    tenant_cells: DashMap<String, Arc<Mutex<()>>>,
}

impl AutoReplyEngine {
    pub fn new(db: Database, provider: Arc<dyn ReplyProvider>, config: AutoReplyConfig) -> Self {
        Self {
            db,
            provider,
            config,
            tenant_cells: DashMap::new(),
        }
    }

    fn cell(&self, tenant_id: &str) -> Arc<Mutex<()>> {
        self.tenant_cells
            .entry(tenant_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Generate a reply for an inbound message that already passed
    /// [`crate::policy::should_respond`]. The inbound message must be
    /// persisted first; the context window is read from storage and
    /// includes it.
    ///
    /// Returns:
    /// - `Ok(Some(reply))` on success (counters updated),
    /// - `Ok(None)` on provider failure or timeout (no reply, inbound
    ///   message untouched),
    /// - `Err(QuotaExceeded)` when a quota declines generation, distinct
    ///   from generic failure.
    pub async fn generate_reply(
        &self,
        tenant_id: &str,
        conversation_id: &str,
    ) -> Result<Option<GeneratedReply>, WaylinkError> {
        let cell = self.cell(tenant_id);
        let _guard = cell.lock().await;

        let policy = policies::get_or_default(&self.db, tenant_id).await?;
        if !policy.enabled {
            return Ok(None);
        }

        let now = Utc::now();
        let mut usage = policy.usage.clone();
        if maybe_reset(&mut usage, now) {
            // Persist the reset even when the quota check below declines,
            // so the boundary is only crossed once.
            policies::update_usage(&self.db, tenant_id, &usage).await?;
        }

        if let Err(e) = check_quota(&policy.limits, &usage) {
            info!(tenant = tenant_id, reason = %e, "auto-reply declined by quota");
            return Err(e);
        }

        // Whether this conversation is newly automated today, for the
        // conversation quota.
        let today_start = now.format("%Y-%m-%dT00:00:00.000Z").to_string();
        let newly_automated =
            messages::automated_count_since(&self.db, conversation_id, &today_start).await? == 0;

        let window =
            messages::recent_for_conversation(&self.db, conversation_id, policy.context_window)
                .await?;
        if window.is_empty() {
            warn!(conversation = conversation_id, "no messages to reply to");
            return Ok(None);
        }

        let system_prompt = compose_system_prompt(&policy);
        let chat: Vec<ChatMessage> = window.iter().map(to_chat_message).collect();
        let prompt_hash = fingerprint(&system_prompt, &chat);

        let request = ReplyRequest {
            system_prompt: Some(system_prompt),
            messages: chat,
            max_tokens: policy.max_tokens,
            temperature: policy.temperature,
        };

        let timeout = Duration::from_secs(self.config.provider_timeout_secs);
        let response = match tokio::time::timeout(timeout, self.provider.complete(request)).await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                // Provider failure is swallowed at this boundary: the
                // inbound message stays available for manual handling.
                warn!(tenant = tenant_id, error = %e, "provider call failed, no auto-reply");
                return Ok(None);
            }
            Err(_) => {
                warn!(
                    tenant = tenant_id,
                    timeout_secs = self.config.provider_timeout_secs,
                    "provider call timed out, no auto-reply"
                );
                return Ok(None);
            }
        };

        usage.tokens_today += response.tokens_used as u64;
        usage.tokens_month += response.tokens_used as u64;
        if newly_automated {
            usage.conversations_today += 1;
        }
        policies::update_usage(&self.db, tenant_id, &usage).await?;

        debug!(
            tenant = tenant_id,
            conversation = conversation_id,
            tokens = response.tokens_used,
            "auto-reply generated"
        );

        Ok(Some(GeneratedReply {
            text: response.text,
            model: response.model,
            tokens_used: response.tokens_used,
            prompt_hash,
            delay: Duration::from_secs(policy.reply_delay_secs as u64),
        }))
    }
}

/// The policy's configured prompt, falling back to a personality-derived
/// default.
fn compose_system_prompt(policy: &AutoReplyPolicy) -> String {
    if let Some(prompt) = policy
        .system_prompt
        .as_deref()
        .filter(|p| !p.trim().is_empty())
    {
        return prompt.to_string();
    }
    let personality = policy.personality.as_deref().unwrap_or("a helpful assistant");
    format!(
        "You are {personality}, answering customers over WhatsApp on behalf of the business. \
         Reply to the latest customer message. Keep replies short and conversational."
    )
}

/// Map a stored message to its provider role: inbound is the customer
/// (`user`), outbound is the business (`assistant`).
fn to_chat_message(message: &StoredMessage) -> ChatMessage {
    match message.direction {
        Direction::Inbound => ChatMessage::user(message.content.clone()),
        Direction::Outbound => ChatMessage::assistant(message.content.clone()),
    }
}

/// Short fingerprint of the exact prompt sent to the provider.
fn fingerprint(system_prompt: &str, messages: &[ChatMessage]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(system_prompt.as_bytes());
    for message in messages {
        hasher.update(message.role.as_bytes());
        hasher.update(b"\0");
        hasher.update(message.content.as_bytes());
        hasher.update(b"\0");
    }
    hex::encode(&hasher.finalize()[..8])
}
