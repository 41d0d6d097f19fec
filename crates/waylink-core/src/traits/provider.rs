// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider adapter trait for language-model integrations.

use async_trait::async_trait;

use crate::error::WaylinkError;
use crate::types::{ReplyRequest, ReplyResponse};

/// Adapter for the language-model provider used by the auto-response engine.
///
/// A single chat-style completion call: ordered role-tagged messages plus
/// generation parameters in, generated text plus a token-cost figure out.
#[async_trait]
pub trait ReplyProvider: Send + Sync {
    /// Sends a completion request and returns the full response.
    async fn complete(&self, request: ReplyRequest) -> Result<ReplyResponse, WaylinkError>;
}
