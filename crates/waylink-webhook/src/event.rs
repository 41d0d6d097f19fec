// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook event envelope and typed payloads.
//!
//! The gateway posts an envelope `{event, instance, data, apikey,
//! server_url}` per callback. Unrecognized event kinds are accepted and
//! ignored, never rejected, to remain forward-compatible with the
//! gateway's event catalog.

use serde::{Deserialize, Serialize};

/// The event envelope delivered by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    /// Event kind string, e.g. "connection.update".
    pub event: String,
    /// Gateway instance key the event belongs to.
    #[serde(default)]
    pub instance: String,
    /// Event-specific payload.
    #[serde(default)]
    pub data: serde_json::Value,
    /// Credential field checked by the authentication gate.
    #[serde(default)]
    pub apikey: Option<String>,
    /// Base URL of the gateway deployment that sent the event.
    #[serde(default)]
    pub server_url: Option<String>,
}

/// Recognized event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Connection-state change.
    ConnectionUpdate,
    /// Pairing-payload (QR/code) update.
    PairingUpdate,
    /// New or updated message.
    MessageUpsert,
    /// Anything else: accepted and ignored.
    Other,
}

impl WebhookEnvelope {
    /// Classify the envelope's event string.
    pub fn kind(&self) -> EventKind {
        match self.event.as_str() {
            "connection.update" => EventKind::ConnectionUpdate,
            "qrcode.updated" => EventKind::PairingUpdate,
            "messages.upsert" => EventKind::MessageUpsert,
            _ => EventKind::Other,
        }
    }

    /// Deserialize the data payload into a typed struct.
    pub fn parse_data<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.clone())
    }
}

/// Payload of a `connection.update` event.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionUpdateData {
    /// New connection state string ("open", "connecting", "close").
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default, rename = "statusReason")]
    pub status_reason: Option<i64>,
}

/// Payload of a `qrcode.updated` event.
#[derive(Debug, Clone, Deserialize)]
pub struct PairingUpdateData {
    #[serde(default)]
    pub qrcode: Option<PairingData>,
}

/// Pairing payload fields.
#[derive(Debug, Clone, Deserialize)]
pub struct PairingData {
    #[serde(default, rename = "pairingCode")]
    pub pairing_code: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub base64: Option<String>,
}

impl PairingData {
    /// Whichever payload form the gateway issued, code preferred.
    pub fn value(&self) -> Option<&str> {
        self.pairing_code
            .as_deref()
            .or(self.code.as_deref())
            .or(self.base64.as_deref())
    }
}

/// Payload of a `messages.upsert` event.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageUpsertData {
    pub key: MessageKeyData,
    #[serde(default, rename = "pushName")]
    pub push_name: Option<String>,
    #[serde(default)]
    pub message: Option<MessageContent>,
}

/// Gateway message key: counterpart JID, direction flag, message id.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageKeyData {
    #[serde(rename = "remoteJid")]
    pub remote_jid: String,
    #[serde(default, rename = "fromMe")]
    pub from_me: bool,
    pub id: String,
}

/// Message content variants the gateway delivers for text.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageContent {
    #[serde(default)]
    pub conversation: Option<String>,
    #[serde(default, rename = "extendedTextMessage")]
    pub extended_text: Option<ExtendedText>,
}

/// Wrapper for link-preview style text messages.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtendedText {
    #[serde(default)]
    pub text: Option<String>,
}

impl MessageUpsertData {
    /// The text body, from whichever content variant is present.
    pub fn text(&self) -> Option<&str> {
        let content = self.message.as_ref()?;
        content
            .conversation
            .as_deref()
            .or_else(|| content.extended_text.as_ref()?.text.as_deref())
    }

    /// The counterpart address with the JID suffix stripped.
    pub fn counterpart(&self) -> &str {
        self.key
            .remote_jid
            .split('@')
            .next()
            .unwrap_or(&self.key.remote_jid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_classifies_known_events() {
        let envelope: WebhookEnvelope = serde_json::from_str(
            r#"{"event": "connection.update", "instance": "wa-1", "data": {"state": "open"}}"#,
        )
        .unwrap();
        assert_eq!(envelope.kind(), EventKind::ConnectionUpdate);
        assert_eq!(envelope.instance, "wa-1");

        let data: ConnectionUpdateData = envelope.parse_data().unwrap();
        assert_eq!(data.state.as_deref(), Some("open"));
    }

    #[test]
    fn unrecognized_event_is_other_not_an_error() {
        let envelope: WebhookEnvelope = serde_json::from_str(
            r#"{"event": "contacts.update", "instance": "wa-1", "data": [{"id": "x"}]}"#,
        )
        .unwrap();
        assert_eq!(envelope.kind(), EventKind::Other);
    }

    #[test]
    fn pairing_update_prefers_code_over_qr() {
        let envelope: WebhookEnvelope = serde_json::from_str(
            r#"{
                "event": "qrcode.updated",
                "instance": "wa-1",
                "data": {"qrcode": {"pairingCode": "WZYEH1YY", "base64": "iVBOR"}}
            }"#,
        )
        .unwrap();
        assert_eq!(envelope.kind(), EventKind::PairingUpdate);
        let data: PairingUpdateData = envelope.parse_data().unwrap();
        assert_eq!(data.qrcode.unwrap().value(), Some("WZYEH1YY"));
    }

    #[test]
    fn message_upsert_extracts_text_and_counterpart() {
        let envelope: WebhookEnvelope = serde_json::from_str(
            r#"{
                "event": "messages.upsert",
                "instance": "wa-1",
                "apikey": "secret",
                "data": {
                    "key": {"remoteJid": "15550001111@s.whatsapp.net", "fromMe": false, "id": "ABC"},
                    "pushName": "Ada",
                    "message": {"conversation": "hello there"}
                }
            }"#,
        )
        .unwrap();
        assert_eq!(envelope.kind(), EventKind::MessageUpsert);
        let data: MessageUpsertData = envelope.parse_data().unwrap();
        assert_eq!(data.text(), Some("hello there"));
        assert_eq!(data.counterpart(), "15550001111");
        assert!(!data.key.from_me);
    }

    #[test]
    fn message_upsert_reads_extended_text() {
        let data: MessageUpsertData = serde_json::from_str(
            r#"{
                "key": {"remoteJid": "15550001111@s.whatsapp.net", "id": "ABC"},
                "message": {"extendedTextMessage": {"text": "with a link"}}
            }"#,
        )
        .unwrap();
        assert_eq!(data.text(), Some("with a link"));
    }
}
