// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway wire types. The gateway's JSON surface uses camelCase field
//! names; these structs are pure data transfer with no behavior.

use serde::{Deserialize, Serialize};

/// Request body for instance creation.
#[derive(Debug, Clone, Serialize)]
pub struct CreateInstanceRequest {
    #[serde(rename = "instanceName")]
    pub instance_name: String,
    /// Callback URL the gateway will deliver this instance's events to.
    pub webhook: String,
}

/// Response from instance creation.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateInstanceResponse {
    pub instance: WireInstance,
    pub hash: InstanceHash,
}

/// The per-instance credential issued at creation.
#[derive(Debug, Clone, Deserialize)]
pub struct InstanceHash {
    pub apikey: String,
}

/// Instance descriptor as it appears across gateway responses.
#[derive(Debug, Clone, Deserialize)]
pub struct WireInstance {
    #[serde(rename = "instanceName")]
    pub instance_name: String,
    /// Connection state string ("open", "connecting", "close").
    #[serde(default)]
    pub state: Option<String>,
    /// Owner JID, e.g. "15551234567@s.whatsapp.net", known once paired.
    #[serde(default)]
    pub owner: Option<String>,
}

impl WireInstance {
    /// The bare phone number from the owner JID, if present.
    pub fn phone_number(&self) -> Option<String> {
        self.owner
            .as_deref()
            .map(|owner| owner.split('@').next().unwrap_or(owner).to_string())
    }
}

/// Response from the connection-state query.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionStateResponse {
    pub instance: WireInstance,
}

/// Response from the pairing request. The gateway issues a numeric pairing
/// code, a QR payload, or both.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectResponse {
    #[serde(default, rename = "pairingCode")]
    pub pairing_code: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub base64: Option<String>,
}

/// Request body for a text send.
#[derive(Debug, Clone, Serialize)]
pub struct SendTextRequest {
    pub number: String,
    pub text: String,
}

/// Response from a text send.
#[derive(Debug, Clone, Deserialize)]
pub struct SendTextResponse {
    pub key: MessageKey,
    #[serde(default)]
    pub status: Option<String>,
}

/// Gateway-side message key.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageKey {
    pub id: String,
}

/// One row of the instance listing.
#[derive(Debug, Clone, Deserialize)]
pub struct FetchInstancesRow {
    pub instance: WireInstance,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_uses_camel_case() {
        let req = CreateInstanceRequest {
            instance_name: "wa-acc-1".into(),
            webhook: "https://app.example.com/webhook/wa-acc-1".into(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["instanceName"], "wa-acc-1");
        assert!(json.get("instance_name").is_none());
    }

    #[test]
    fn create_response_parses_issued_credential() {
        let json = r#"{
            "instance": {"instanceName": "wa-acc-1", "state": "close"},
            "hash": {"apikey": "3A1F-secret"}
        }"#;
        let resp: CreateInstanceResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.instance.instance_name, "wa-acc-1");
        assert_eq!(resp.hash.apikey, "3A1F-secret");
    }

    #[test]
    fn phone_number_strips_jid_suffix() {
        let instance = WireInstance {
            instance_name: "wa-1".into(),
            state: Some("open".into()),
            owner: Some("15551234567@s.whatsapp.net".into()),
        };
        assert_eq!(instance.phone_number().as_deref(), Some("15551234567"));

        let bare = WireInstance {
            instance_name: "wa-1".into(),
            state: None,
            owner: None,
        };
        assert_eq!(bare.phone_number(), None);
    }

    #[test]
    fn connect_response_tolerates_partial_payloads() {
        let code_only: ConnectResponse =
            serde_json::from_str(r#"{"pairingCode": "ABCD-1234"}"#).unwrap();
        assert_eq!(code_only.pairing_code.as_deref(), Some("ABCD-1234"));
        assert!(code_only.base64.is_none());

        let qr_only: ConnectResponse =
            serde_json::from_str(r#"{"base64": "data:image/png;base64,iVBOR"}"#).unwrap();
        assert!(qr_only.pairing_code.is_none());
        assert!(qr_only.base64.is_some());
    }
}
