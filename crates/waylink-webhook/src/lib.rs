// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound webhook server and authentication gate.
//!
//! Verifies that gateway callbacks genuinely originate from the legitimate
//! gateway deployment before any handler runs: network-origin allow-list
//! AND (per-account secret OR shared secret OR body signature).

pub mod event;
pub mod gate;
pub mod handlers;
pub mod server;

use async_trait::async_trait;
use waylink_core::WaylinkError;

pub use event::{EventKind, WebhookEnvelope};
pub use gate::{AuthorizedBy, GateConfig};
pub use server::{router, start_server, WebhookState};

/// Downstream consumer of authenticated webhook events.
///
/// Implemented by the application's inbound pipeline; the webhook crate
/// never interprets event semantics beyond authentication.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn handle_event(&self, envelope: WebhookEnvelope) -> Result<(), WaylinkError>;
}
