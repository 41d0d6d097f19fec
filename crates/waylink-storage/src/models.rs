// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model types for storage entities.
//!
//! Timestamps are ISO 8601 UTC strings, matching the SQLite column defaults,
//! so Rust-side and SQLite-side values compare lexicographically.

use serde::{Deserialize, Serialize};
use waylink_core::types::{
    ConnectionState, ConversationStatus, DeliveryStatus, Direction, JobKind, JobStatus,
    ReplyMode, StateSource, WeeklyHours,
};

/// A tenant-owned WhatsApp connection.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    /// Opaque key addressing the gateway-side instance.
    pub instance_key: String,
    /// Per-account credential issued by the gateway. `None` when
    /// provisioning failed; such an account is `Failed`.
    pub instance_token: Option<String>,
    pub state: ConnectionState,
    pub phone_number: Option<String>,
    /// Cached pairing code/QR payload; present only while `Connecting`.
    pub pairing_code: Option<String>,
    pub last_connected_at: Option<String>,
    /// Timestamp of the newest applied state observation.
    pub state_observed_at: Option<String>,
    /// Source of the newest applied state observation.
    pub state_source: Option<StateSource>,
    /// Consecutive unauthorized/not-found reports from the gateway.
    pub gateway_misses: u32,
    /// Flagged for operator attention after repeated gateway misses.
    pub orphaned: bool,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

/// One conversation per (account, counterpart address) pair.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: String,
    pub account_id: String,
    pub counterpart: String,
    pub status: ConversationStatus,
    pub unread_count: u32,
    pub last_activity_at: String,
    pub created_at: String,
}

/// A message within a conversation.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub id: String,
    pub conversation_id: String,
    pub direction: Direction,
    pub content: String,
    pub media_url: Option<String>,
    pub media_kind: Option<String>,
    pub delivery_status: DeliveryStatus,
    pub delivery_error: Option<String>,
    /// Automation record, present only when the auto-response engine
    /// generated or processed this message.
    pub automation: Option<AutomationRecord>,
    pub created_at: String,
}

/// Provenance of an automated message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutomationRecord {
    pub model: String,
    pub tokens: u32,
    pub prompt_hash: String,
}

/// A requested send in the durable dispatch queue.
#[derive(Debug, Clone)]
pub struct DispatchJob {
    pub id: i64,
    pub tenant_id: String,
    pub account_id: String,
    pub recipient: String,
    pub payload: String,
    pub kind: JobKind,
    /// Bulk submissions share a batch id.
    pub batch_id: Option<String>,
    /// Originating message row, when the send tracks one.
    pub message_id: Option<String>,
    pub status: JobStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    /// Earliest-send time; immediate sends use enqueue time.
    pub not_before: String,
    pub locked_until: Option<String>,
    pub last_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Per-tenant auto-response configuration and usage state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoReplyPolicy {
    pub tenant_id: String,
    pub enabled: bool,
    pub mode: ReplyMode,
    /// IANA timezone name for business-hours evaluation.
    pub timezone: String,
    pub hours: WeeklyHours,
    pub keywords: Vec<String>,
    pub system_prompt: Option<String>,
    /// Personality used to derive a default system prompt when
    /// `system_prompt` is unset.
    pub personality: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Number of recent conversation messages included as context.
    pub context_window: u32,
    /// Delay before a generated reply is dispatched, in seconds.
    pub reply_delay_secs: u32,
    pub usage: UsageCounters,
    pub limits: PolicyLimits,
}

/// Running usage counters, reset at UTC calendar boundaries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageCounters {
    pub tokens_today: u64,
    pub tokens_month: u64,
    pub conversations_today: u64,
    /// Timestamp of the last counter reset, ISO 8601 UTC.
    pub counters_reset_at: String,
}

/// Hard quotas gating the auto-response engine. `None` means unlimited.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyLimits {
    pub daily_token_limit: Option<u64>,
    pub monthly_token_limit: Option<u64>,
    pub daily_conversation_limit: Option<u64>,
}

impl AutoReplyPolicy {
    /// A disabled manual-mode policy with default generation parameters.
    pub fn default_for(tenant_id: &str) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            enabled: false,
            mode: ReplyMode::Manual,
            timezone: "UTC".to_string(),
            hours: WeeklyHours::default(),
            keywords: Vec::new(),
            system_prompt: None,
            personality: None,
            temperature: 0.7,
            max_tokens: 512,
            context_window: 10,
            reply_delay_secs: 0,
            usage: UsageCounters {
                counters_reset_at: crate::database::now_iso(),
                ..UsageCounters::default()
            },
            limits: PolicyLimits::default(),
        }
    }
}
