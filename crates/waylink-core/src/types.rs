// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared across the Waylink workspace.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Unique identifier for a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

/// Unique identifier for a WhatsApp account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub String);

/// Unique identifier for a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

/// Unique identifier for a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Local connection lifecycle state of an account.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Unrecoverable provisioning error. Requires manual recreation;
    /// polling never auto-retries it.
    Failed,
}

/// Which reconciliation source produced a state observation.
///
/// Webhook observations win ties against stored state; poll observations
/// must be strictly newer to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StateSource {
    Poll,
    Webhook,
}

/// Message direction relative to the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Delivery status of an outbound message. Forward progress only, except
/// `Failed`, which is terminal for that attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Delivered,
    Read,
    Failed,
}

/// Conversation lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Active,
    Archived,
    Closed,
}

/// Kind of a dispatch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Single,
    BulkItem,
    Scheduled,
}

/// Status of a dispatch job. `Delivered` and `DeadLettered` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Delivered,
    DeadLettered,
}

/// Rule determining whether auto-response fires for an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReplyMode {
    Always,
    BusinessHours,
    OutsideHours,
    Keywords,
    Manual,
}

// --- Business-hours types ---

/// A single weekday's open/close window, in the policy's local timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayWindow {
    pub open: chrono::NaiveTime,
    pub close: chrono::NaiveTime,
}

/// Per-weekday business-hours table. Index 0 is Monday, matching
/// [`chrono::Weekday::num_days_from_monday`]. A `None` entry means no
/// window is configured for that day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyHours {
    pub windows: [Option<DayWindow>; 7],
}

impl WeeklyHours {
    /// The configured window for a weekday, if any.
    pub fn window_for(&self, weekday: chrono::Weekday) -> Option<&DayWindow> {
        self.windows[weekday.num_days_from_monday() as usize].as_ref()
    }

    /// Set the window for a weekday.
    pub fn set(&mut self, weekday: chrono::Weekday, window: Option<DayWindow>) {
        self.windows[weekday.num_days_from_monday() as usize] = window;
    }

    /// True when no day has a configured window.
    pub fn is_empty(&self) -> bool {
        self.windows.iter().all(Option::is_none)
    }
}

// --- Gateway data-transfer types ---

/// Connection state as reported by the gateway wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WireState {
    /// Fully paired and online.
    Open,
    /// Pairing in progress.
    Connecting,
    /// Logged out or never paired.
    Close,
}

impl WireState {
    /// Map the gateway's reported state onto the local lifecycle.
    pub fn to_connection_state(self) -> ConnectionState {
        match self {
            WireState::Open => ConnectionState::Connected,
            WireState::Connecting => ConnectionState::Connecting,
            WireState::Close => ConnectionState::Disconnected,
        }
    }
}

/// A newly provisioned gateway instance with its issued credential.
#[derive(Debug, Clone)]
pub struct ProvisionedInstance {
    pub instance_key: String,
    pub token: String,
}

/// Gateway view of an instance's connection state.
#[derive(Debug, Clone)]
pub struct GatewayStateView {
    pub state: WireState,
    /// Phone identity (JID/number), known once paired.
    pub phone_number: Option<String>,
}

/// Pairing payload for an instance that is not yet connected.
#[derive(Debug, Clone)]
pub struct PairingPayload {
    /// Numeric pairing code, when the gateway issued one.
    pub code: Option<String>,
    /// Base64-encoded QR image, when the gateway issued one.
    pub qr_base64: Option<String>,
}

impl PairingPayload {
    /// A displayable form of whichever payload the gateway issued.
    pub fn display_value(&self) -> Option<&str> {
        self.code.as_deref().or(self.qr_base64.as_deref())
    }
}

/// Summary row from the gateway's instance listing.
#[derive(Debug, Clone)]
pub struct InstanceSummary {
    pub instance_key: String,
    pub state: WireState,
}

// --- Provider data-transfer types ---

/// A role-tagged message in a provider chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// "user" or "assistant".
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// A chat-style completion request to the language-model provider.
#[derive(Debug, Clone)]
pub struct ReplyRequest {
    /// System instruction prefixed to the conversation.
    pub system_prompt: Option<String>,
    /// Conversation context, oldest first.
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// A completion from the language-model provider.
#[derive(Debug, Clone)]
pub struct ReplyResponse {
    pub text: String,
    /// Model that produced the text.
    pub model: String,
    /// Token cost of the call (input + output).
    pub tokens_used: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn connection_state_round_trips_through_strings() {
        for state in [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Failed,
        ] {
            let s = state.to_string();
            assert_eq!(ConnectionState::from_str(&s).unwrap(), state);
        }
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
    }

    #[test]
    fn wire_state_maps_to_local_lifecycle() {
        assert_eq!(
            WireState::Open.to_connection_state(),
            ConnectionState::Connected
        );
        assert_eq!(
            WireState::Connecting.to_connection_state(),
            ConnectionState::Connecting
        );
        assert_eq!(
            WireState::Close.to_connection_state(),
            ConnectionState::Disconnected
        );
    }

    #[test]
    fn job_status_string_forms() {
        assert_eq!(JobStatus::DeadLettered.to_string(), "dead_lettered");
        assert_eq!(
            JobStatus::from_str("dead_lettered").unwrap(),
            JobStatus::DeadLettered
        );
    }

    #[test]
    fn reply_mode_serde_snake_case() {
        let json = serde_json::to_string(&ReplyMode::BusinessHours).unwrap();
        assert_eq!(json, r#""business_hours""#);
        let parsed: ReplyMode = serde_json::from_str(r#""outside_hours""#).unwrap();
        assert_eq!(parsed, ReplyMode::OutsideHours);
    }

    #[test]
    fn pairing_payload_prefers_code() {
        let payload = PairingPayload {
            code: Some("ABCD-1234".into()),
            qr_base64: Some("aGVsbG8=".into()),
        };
        assert_eq!(payload.display_value(), Some("ABCD-1234"));

        let qr_only = PairingPayload {
            code: None,
            qr_base64: Some("aGVsbG8=".into()),
        };
        assert_eq!(qr_only.display_value(), Some("aGVsbG8="));
    }

    #[test]
    fn chat_message_constructors() {
        let m = ChatMessage::user("hi");
        assert_eq!(m.role, "user");
        let m = ChatMessage::assistant("hello");
        assert_eq!(m.role, "assistant");
    }

    #[test]
    fn weekly_hours_indexes_by_weekday() {
        use chrono::{NaiveTime, Weekday};

        let mut hours = WeeklyHours::default();
        assert!(hours.is_empty());

        let window = DayWindow {
            open: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            close: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
        };
        hours.set(Weekday::Mon, Some(window));

        assert!(!hours.is_empty());
        assert_eq!(hours.window_for(Weekday::Mon), Some(&window));
        assert_eq!(hours.window_for(Weekday::Tue), None);
        assert_eq!(hours.window_for(Weekday::Sun), None);
    }

    #[test]
    fn weekly_hours_serde_round_trip() {
        use chrono::{NaiveTime, Weekday};

        let mut hours = WeeklyHours::default();
        hours.set(
            Weekday::Fri,
            Some(DayWindow {
                open: NaiveTime::from_hms_opt(8, 30, 0).unwrap(),
                close: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            }),
        );
        let json = serde_json::to_string(&hours).unwrap();
        let parsed: WeeklyHours = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, hours);
    }
}
