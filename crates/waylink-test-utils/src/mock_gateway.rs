// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock messaging gateway for deterministic testing.
//!
//! `MockGateway` implements `GatewayApi` with scripted responses per
//! instance and records every call for assertion.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use waylink_core::types::{
    GatewayStateView, InstanceSummary, PairingPayload, ProvisionedInstance, WireState,
};
use waylink_core::{GatewayApi, WaylinkError};

/// Scripted outcome of a connection-state query.
#[derive(Debug, Clone)]
pub enum StateScript {
    /// Report the given wire state with an optional phone identity.
    State(WireState, Option<String>),
    /// Report the instance as unknown (404-equivalent).
    NotFound,
    /// Fail transiently (network/5xx-equivalent).
    Transient,
}

/// Scripted outcome of a send.
#[derive(Debug, Clone)]
pub enum SendScript {
    Ok,
    Transient,
    Permanent,
    NotFound,
}

/// A recorded send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSend {
    pub instance_key: String,
    pub recipient: String,
    pub text: String,
}

/// A mock gateway with per-instance state scripts and a FIFO send script.
///
/// Unscripted state queries report `NotFound`; unscripted sends succeed.
pub struct MockGateway {
    state_scripts: Arc<Mutex<HashMap<String, VecDeque<StateScript>>>>,
    send_scripts: Arc<Mutex<VecDeque<SendScript>>>,
    sends: Arc<Mutex<Vec<RecordedSend>>>,
    deleted: Arc<Mutex<Vec<String>>>,
    disconnected: Arc<Mutex<Vec<String>>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            state_scripts: Arc::new(Mutex::new(HashMap::new())),
            send_scripts: Arc::new(Mutex::new(VecDeque::new())),
            sends: Arc::new(Mutex::new(Vec::new())),
            deleted: Arc::new(Mutex::new(Vec::new())),
            disconnected: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue a state-query outcome for an instance.
    pub async fn push_state(&self, instance_key: &str, script: StateScript) {
        self.state_scripts
            .lock()
            .await
            .entry(instance_key.to_string())
            .or_default()
            .push_back(script);
    }

    /// Queue a send outcome.
    pub async fn push_send(&self, script: SendScript) {
        self.send_scripts.lock().await.push_back(script);
    }

    /// Sends recorded so far.
    pub async fn sends(&self) -> Vec<RecordedSend> {
        self.sends.lock().await.clone()
    }

    /// Instances deleted so far.
    pub async fn deleted(&self) -> Vec<String> {
        self.deleted.lock().await.clone()
    }

    /// Instances logged out so far.
    pub async fn disconnected(&self) -> Vec<String> {
        self.disconnected.lock().await.clone()
    }

    fn not_found(instance_key: &str) -> WaylinkError {
        WaylinkError::GatewayUnavailable {
            instance: instance_key.to_string(),
            message: "mock: instance not found".to_string(),
        }
    }

    fn transient() -> WaylinkError {
        WaylinkError::Gateway {
            message: "mock: transient failure".to_string(),
            transient: true,
            source: None,
        }
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GatewayApi for MockGateway {
    async fn create_instance(
        &self,
        instance_key: &str,
        _webhook_url: &str,
    ) -> Result<ProvisionedInstance, WaylinkError> {
        Ok(ProvisionedInstance {
            instance_key: instance_key.to_string(),
            token: format!("mock-token-{}", uuid::Uuid::new_v4()),
        })
    }

    async fn connection_state(
        &self,
        instance_key: &str,
        _token: &str,
    ) -> Result<GatewayStateView, WaylinkError> {
        let script = self
            .state_scripts
            .lock()
            .await
            .get_mut(instance_key)
            .and_then(|queue| queue.pop_front());

        match script {
            Some(StateScript::State(state, phone_number)) => Ok(GatewayStateView {
                state,
                phone_number,
            }),
            Some(StateScript::NotFound) | None => Err(Self::not_found(instance_key)),
            Some(StateScript::Transient) => Err(Self::transient()),
        }
    }

    async fn pairing_payload(
        &self,
        _instance_key: &str,
        _token: &str,
    ) -> Result<PairingPayload, WaylinkError> {
        Ok(PairingPayload {
            code: Some("MOCK-CODE".to_string()),
            qr_base64: None,
        })
    }

    async fn send_text(
        &self,
        instance_key: &str,
        _token: &str,
        recipient: &str,
        text: &str,
    ) -> Result<String, WaylinkError> {
        self.sends.lock().await.push(RecordedSend {
            instance_key: instance_key.to_string(),
            recipient: recipient.to_string(),
            text: text.to_string(),
        });

        let script = self
            .send_scripts
            .lock()
            .await
            .pop_front()
            .unwrap_or(SendScript::Ok);

        match script {
            SendScript::Ok => Ok(format!("mock-msg-{}", uuid::Uuid::new_v4())),
            SendScript::Transient => Err(Self::transient()),
            SendScript::Permanent => Err(WaylinkError::Gateway {
                message: "mock: invalid recipient".to_string(),
                transient: false,
                source: None,
            }),
            SendScript::NotFound => Err(Self::not_found(instance_key)),
        }
    }

    async fn disconnect(&self, instance_key: &str, _token: &str) -> Result<(), WaylinkError> {
        self.disconnected.lock().await.push(instance_key.to_string());
        Ok(())
    }

    async fn delete_instance(&self, instance_key: &str) -> Result<(), WaylinkError> {
        self.deleted.lock().await.push(instance_key.to_string());
        Ok(())
    }

    async fn list_instances(&self) -> Result<Vec<InstanceSummary>, WaylinkError> {
        Ok(Vec::new())
    }
}
