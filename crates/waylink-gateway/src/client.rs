// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the messaging gateway REST surface.
//!
//! Provides [`GatewayClient`], which handles request construction,
//! per-call credential selection, HTTP status classification into the
//! Waylink error taxonomy, and transient-error retry for read-style
//! operations. Sends are single-attempt: the dispatch queue owns retry
//! accounting for them.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, warn};
use waylink_config::model::GatewayConfig;
use waylink_core::types::{
    GatewayStateView, InstanceSummary, PairingPayload, ProvisionedInstance, WireState,
};
use waylink_core::{GatewayApi, WaylinkError};

use crate::types::{
    ConnectResponse, ConnectionStateResponse, CreateInstanceRequest, CreateInstanceResponse,
    FetchInstancesRow, SendTextRequest, SendTextResponse,
};

/// HTTP client for gateway communication.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: reqwest::Client,
    base_url: String,
    deployment_key: String,
    max_retries: u32,
}

impl GatewayClient {
    /// Creates a new gateway client from configuration.
    ///
    /// Fails with a configuration error when no deployment credential is
    /// available.
    pub fn new(config: &GatewayConfig) -> Result<Self, WaylinkError> {
        let deployment_key = config
            .api_key
            .clone()
            .ok_or_else(|| {
                WaylinkError::Config(
                    "gateway.api_key is required (set WAYLINK_GATEWAY_API_KEY)".to_string(),
                )
            })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| WaylinkError::Gateway {
                message: format!("failed to build HTTP client: {e}"),
                transient: false,
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            deployment_key,
            max_retries: 1,
        })
    }

    /// Overrides the base URL (for testing with wiremock).
    #[cfg(test)]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Issue a request with transient retry, returning the parsed body.
    async fn request_with_retry<T: serde::de::DeserializeOwned>(
        &self,
        build: impl Fn() -> reqwest::RequestBuilder,
        instance_key: &str,
    ) -> Result<T, WaylinkError> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(attempt, instance = instance_key, "retrying gateway request");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }

            let response = match build().send().await {
                Ok(response) => response,
                Err(e) => {
                    // Network-level failure: transient.
                    last_error = Some(WaylinkError::Gateway {
                        message: format!("gateway request failed: {e}"),
                        transient: true,
                        source: Some(Box::new(e)),
                    });
                    continue;
                }
            };

            let status = response.status();
            debug!(status = %status, attempt, instance = instance_key, "gateway response");

            if status.is_success() {
                let body = response.text().await.map_err(|e| WaylinkError::Gateway {
                    message: format!("failed to read gateway response: {e}"),
                    transient: true,
                    source: Some(Box::new(e)),
                })?;
                return serde_json::from_str(&body).map_err(|e| WaylinkError::Gateway {
                    message: format!("failed to parse gateway response: {e}"),
                    transient: false,
                    source: Some(Box::new(e)),
                });
            }

            let body = response.text().await.unwrap_or_default();
            let error = classify_status(status, instance_key, &body);
            if error.is_transient() && attempt < self.max_retries {
                last_error = Some(error);
                continue;
            }
            return Err(error);
        }

        Err(last_error.unwrap_or_else(|| WaylinkError::Gateway {
            message: "gateway request failed after retries".into(),
            transient: true,
            source: None,
        }))
    }

    /// Like [`Self::request_with_retry`] but discards the response body.
    /// Logout/delete responses vary between gateway versions and may be
    /// empty.
    async fn request_ignore_body(
        &self,
        build: impl Fn() -> reqwest::RequestBuilder,
        instance_key: &str,
    ) -> Result<(), WaylinkError> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(attempt, instance = instance_key, "retrying gateway request");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }

            let response = match build().send().await {
                Ok(response) => response,
                Err(e) => {
                    last_error = Some(WaylinkError::Gateway {
                        message: format!("gateway request failed: {e}"),
                        transient: true,
                        source: Some(Box::new(e)),
                    });
                    continue;
                }
            };

            let status = response.status();
            debug!(status = %status, attempt, instance = instance_key, "gateway response");

            if status.is_success() {
                return Ok(());
            }

            let body = response.text().await.unwrap_or_default();
            let error = classify_status(status, instance_key, &body);
            if error.is_transient() && attempt < self.max_retries {
                last_error = Some(error);
                continue;
            }
            return Err(error);
        }

        Err(last_error.unwrap_or_else(|| WaylinkError::Gateway {
            message: "gateway request failed after retries".into(),
            transient: true,
            source: None,
        }))
    }

    /// Single-attempt request for sends; the dispatch queue owns retries.
    async fn request_once<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        instance_key: &str,
    ) -> Result<T, WaylinkError> {
        let response = request.send().await.map_err(|e| WaylinkError::Gateway {
            message: format!("gateway request failed: {e}"),
            transient: true,
            source: Some(Box::new(e)),
        })?;

        let status = response.status();
        debug!(status = %status, instance = instance_key, "gateway response");

        if status.is_success() {
            let body = response.text().await.map_err(|e| WaylinkError::Gateway {
                message: format!("failed to read gateway response: {e}"),
                transient: true,
                source: Some(Box::new(e)),
            })?;
            return serde_json::from_str(&body).map_err(|e| WaylinkError::Gateway {
                message: format!("failed to parse gateway response: {e}"),
                transient: false,
                source: Some(Box::new(e)),
            });
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, instance_key, &body))
    }
}

/// Classify an error status into the Waylink taxonomy.
///
/// 401/403/404 mean the gateway no longer recognizes the instance or its
/// credential; 408/429/5xx are transient; remaining 4xx are permanent
/// (e.g. invalid recipient).
fn classify_status(status: StatusCode, instance_key: &str, body: &str) -> WaylinkError {
    match status.as_u16() {
        401 | 403 | 404 => WaylinkError::GatewayUnavailable {
            instance: instance_key.to_string(),
            message: format!("gateway returned {status}: {body}"),
        },
        408 | 429 | 500..=599 => WaylinkError::Gateway {
            message: format!("gateway returned {status}: {body}"),
            transient: true,
            source: None,
        },
        _ => WaylinkError::Gateway {
            message: format!("gateway returned {status}: {body}"),
            transient: false,
            source: None,
        },
    }
}

/// Parse the gateway's state string, tolerating unknown values.
///
/// Unknown states map to `close` so a gateway upgrade never wedges
/// reconciliation; the raw value is logged.
fn parse_wire_state(raw: Option<&str>) -> WireState {
    match raw {
        Some("open") => WireState::Open,
        Some("connecting") => WireState::Connecting,
        Some("close") | None => WireState::Close,
        Some(other) => {
            warn!(state = other, "unknown gateway state string, treating as close");
            WireState::Close
        }
    }
}

#[async_trait]
impl GatewayApi for GatewayClient {
    async fn create_instance(
        &self,
        instance_key: &str,
        webhook_url: &str,
    ) -> Result<ProvisionedInstance, WaylinkError> {
        let body = CreateInstanceRequest {
            instance_name: instance_key.to_string(),
            webhook: webhook_url.to_string(),
        };
        let url = self.url("/instance/create");
        let response: CreateInstanceResponse = self
            .request_with_retry(
                || {
                    self.client
                        .post(&url)
                        .header("apikey", &self.deployment_key)
                        .json(&body)
                },
                instance_key,
            )
            .await?;
        Ok(ProvisionedInstance {
            instance_key: response.instance.instance_name,
            token: response.hash.apikey,
        })
    }

    async fn connection_state(
        &self,
        instance_key: &str,
        token: &str,
    ) -> Result<GatewayStateView, WaylinkError> {
        let url = self.url(&format!("/instance/connectionState/{instance_key}"));
        let token = token.to_string();
        let response: ConnectionStateResponse = self
            .request_with_retry(
                || self.client.get(&url).header("apikey", token.clone()),
                instance_key,
            )
            .await?;
        Ok(GatewayStateView {
            state: parse_wire_state(response.instance.state.as_deref()),
            phone_number: response.instance.phone_number(),
        })
    }

    async fn pairing_payload(
        &self,
        instance_key: &str,
        token: &str,
    ) -> Result<PairingPayload, WaylinkError> {
        let url = self.url(&format!("/instance/connect/{instance_key}"));
        let token = token.to_string();
        let response: ConnectResponse = self
            .request_with_retry(
                || self.client.get(&url).header("apikey", token.clone()),
                instance_key,
            )
            .await?;
        Ok(PairingPayload {
            code: response.pairing_code.or(response.code),
            qr_base64: response.base64,
        })
    }

    async fn send_text(
        &self,
        instance_key: &str,
        token: &str,
        recipient: &str,
        text: &str,
    ) -> Result<String, WaylinkError> {
        let body = SendTextRequest {
            number: recipient.to_string(),
            text: text.to_string(),
        };
        let url = self.url(&format!("/message/sendText/{instance_key}"));
        let response: SendTextResponse = self
            .request_once(
                self.client.post(&url).header("apikey", token).json(&body),
                instance_key,
            )
            .await?;
        Ok(response.key.id)
    }

    async fn disconnect(&self, instance_key: &str, token: &str) -> Result<(), WaylinkError> {
        let url = self.url(&format!("/instance/logout/{instance_key}"));
        let token = token.to_string();
        self.request_ignore_body(
            || self.client.delete(&url).header("apikey", token.clone()),
            instance_key,
        )
        .await
    }

    async fn delete_instance(&self, instance_key: &str) -> Result<(), WaylinkError> {
        let url = self.url(&format!("/instance/delete/{instance_key}"));
        self.request_ignore_body(
            || {
                self.client
                    .delete(&url)
                    .header("apikey", &self.deployment_key)
            },
            instance_key,
        )
        .await
    }

    async fn list_instances(&self) -> Result<Vec<InstanceSummary>, WaylinkError> {
        let url = self.url("/instance/fetchInstances");
        let rows: Vec<FetchInstancesRow> = self
            .request_with_retry(
                || {
                    self.client
                        .get(&url)
                        .header("apikey", &self.deployment_key)
                },
                "",
            )
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| InstanceSummary {
                state: parse_wire_state(row.instance.state.as_deref()),
                instance_key: row.instance.instance_name,
            })
            .collect())
    }
}
