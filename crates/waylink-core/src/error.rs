// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Waylink platform.

use thiserror::Error;

/// The primary error type used across all Waylink crates.
#[derive(Debug, Error)]
pub enum WaylinkError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The gateway is unreachable or no longer knows the account. The caller
    /// may need to recreate the gateway-side account.
    #[error("gateway unavailable for instance {instance}: {message}")]
    GatewayUnavailable { instance: String, message: String },

    /// A gateway call failed. `transient` drives dispatch retry classification:
    /// network errors, timeouts, and 5xx/429 responses retry; other failures
    /// dead-letter immediately.
    #[error("gateway error: {message}")]
    Gateway {
        message: String,
        transient: bool,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The account has no usable gateway credential. Fatal for the job that
    /// hit it; never retried.
    #[error("missing gateway credential for account {account}")]
    MissingCredential { account: String },

    /// An inbound webhook request failed the authentication gate.
    #[error("unauthorized webhook request: {reason}")]
    Unauthorized { reason: String },

    /// An auto-response was declined because a tenant quota is exhausted.
    /// Not an error toward the inbound message.
    #[error("quota exceeded: {message}")]
    QuotaExceeded { message: String },

    /// Language-model provider errors (API failure, malformed response).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl WaylinkError {
    /// Whether a dispatch attempt that produced this error should be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            WaylinkError::Gateway { transient, .. } => *transient,
            WaylinkError::Timeout { .. } => true,
            _ => false,
        }
    }
}
