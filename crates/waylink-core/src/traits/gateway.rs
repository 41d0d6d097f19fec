// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway adapter trait wrapping the external messaging gateway's REST surface.

use async_trait::async_trait;

use crate::error::WaylinkError;
use crate::types::{
    GatewayStateView, InstanceSummary, PairingPayload, ProvisionedInstance, WireState,
};

/// Typed access to the messaging gateway. No business logic lives behind
/// this trait; callers own classification and retry policy beyond the
/// transient/permanent split encoded in [`WaylinkError::Gateway`].
///
/// Authentication is per call: instance-scoped operations take the
/// account's own credential, deployment-scoped operations (create, delete,
/// list) use the deployment credential held by the implementation.
#[async_trait]
pub trait GatewayApi: Send + Sync {
    /// Provision a new gateway instance and return its issued credential.
    async fn create_instance(
        &self,
        instance_key: &str,
        webhook_url: &str,
    ) -> Result<ProvisionedInstance, WaylinkError>;

    /// Fetch the gateway's current view of an instance's connection state.
    async fn connection_state(
        &self,
        instance_key: &str,
        token: &str,
    ) -> Result<GatewayStateView, WaylinkError>;

    /// Request (or refresh) a pairing payload for an instance that is not
    /// yet connected.
    async fn pairing_payload(
        &self,
        instance_key: &str,
        token: &str,
    ) -> Result<PairingPayload, WaylinkError>;

    /// Send a text message. Returns the gateway-side message id.
    async fn send_text(
        &self,
        instance_key: &str,
        token: &str,
        recipient: &str,
        text: &str,
    ) -> Result<String, WaylinkError>;

    /// Log the instance out of WhatsApp without deleting it.
    async fn disconnect(&self, instance_key: &str, token: &str) -> Result<(), WaylinkError>;

    /// Delete the gateway-side instance entirely.
    async fn delete_instance(&self, instance_key: &str) -> Result<(), WaylinkError>;

    /// List all instances known to the gateway deployment.
    async fn list_instances(&self) -> Result<Vec<InstanceSummary>, WaylinkError>;
}

/// Re-exported for implementors' convenience.
pub type GatewayState = WireState;
