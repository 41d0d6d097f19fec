// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook request handlers.
//!
//! Every callback passes the authentication gate before any business
//! logic. Unauthorized requests get 401 and are logged, never partially
//! processed. Recognized and unrecognized events alike get 200 once
//! authorized; sink errors are logged and contained.

use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use tracing::{debug, error, warn};
use waylink_storage::queries::accounts;

use crate::event::WebhookEnvelope;
use crate::gate::{self, RequestAuth};
use crate::server::WebhookState;

/// `POST /webhook/{instance}` — the gateway callback endpoint.
pub async fn post_webhook(
    State(state): State<WebhookState>,
    Path(path_instance): Path<String>,
    ConnectInfo(socket): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let client_addr = gate::resolve_client_addr(&headers, Some(socket.ip()));

    let envelope: WebhookEnvelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(instance = %path_instance, error = %e, "malformed webhook body");
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "malformed event envelope"})),
            );
        }
    };

    // The envelope's own instance field wins; the path is a fallback for
    // events that omit it.
    let instance_key = if envelope.instance.is_empty() {
        path_instance.clone()
    } else {
        envelope.instance.clone()
    };

    let account = match accounts::get_by_instance_key(&state.db, &instance_key).await {
        Ok(account) => account,
        Err(e) => {
            error!(instance = %instance_key, error = %e, "account lookup failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "internal error"})),
            );
        }
    };
    let account_secret = account.as_ref().and_then(|a| a.instance_token.as_deref());

    let auth = RequestAuth {
        client_addr,
        body: &body,
        apikey: envelope.apikey.as_deref(),
        signature: gate::signature_header(&headers),
        account_secret,
        instance: Some(instance_key.as_str()),
    };

    if let Err(e) = gate::authorize(&state.gate, &auth) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": e.to_string()})),
        );
    }

    debug!(
        instance = %instance_key,
        event = %envelope.event,
        "webhook event accepted"
    );

    // Processing errors are contained: the gateway gets its 200 either
    // way, and reconciliation converges via polling.
    if let Err(e) = state.sink.handle_event(envelope).await {
        error!(instance = %instance_key, error = %e, "webhook event processing failed");
    }

    (StatusCode::OK, Json(serde_json::json!({"status": "ok"})))
}

/// `GET /health` — public liveness endpoint.
pub async fn get_health(State(state): State<WebhookState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}
