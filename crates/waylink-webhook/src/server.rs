// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook HTTP server built on axum.
//!
//! One authenticated route per account-scoped path plus a public health
//! endpoint. Request handling is concurrent per callback; one account's
//! event never blocks another's.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use waylink_core::WaylinkError;
use waylink_storage::Database;

use crate::gate::GateConfig;
use crate::handlers;
use crate::EventSink;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct WebhookState {
    /// Account secret lookups go through storage.
    pub db: Database,
    /// Authentication gate configuration.
    pub gate: GateConfig,
    /// Downstream consumer of authenticated events.
    pub sink: Arc<dyn EventSink>,
    /// Process start time for the health endpoint.
    pub start_time: Instant,
}

/// Build the webhook router.
///
/// - `POST /webhook/{instance}` — gated gateway callbacks
/// - `GET /health` — public, unauthenticated
pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/webhook/{instance}", post(handlers::post_webhook))
        .route("/health", get(handlers::get_health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve the webhook server until the task is cancelled.
pub async fn start_server(
    host: &str,
    port: u16,
    state: WebhookState,
) -> Result<(), WaylinkError> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| WaylinkError::Internal(format!("failed to bind webhook server to {addr}: {e}")))?;

    tracing::info!("webhook server listening on {addr}");

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| WaylinkError::Internal(format!("webhook server error: {e}")))?;

    Ok(())
}
