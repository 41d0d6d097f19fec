// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Waylink platform.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Waylink configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WaylinkConfig {
    /// Platform identity and logging settings.
    #[serde(default)]
    pub platform: PlatformConfig,

    /// Messaging gateway REST client settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Inbound webhook server and authentication gate settings.
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Connection reconciler settings.
    #[serde(default)]
    pub reconciler: ReconcilerConfig,

    /// Outbound dispatch queue settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Auto-response engine settings.
    #[serde(default)]
    pub autoreply: AutoReplyConfig,

    /// Anthropic provider settings.
    #[serde(default)]
    pub anthropic: AnthropicConfig,
}

/// Platform identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PlatformConfig {
    /// Deployment name, used in webhook callback URLs and logs.
    #[serde(default = "default_platform_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            name: default_platform_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_platform_name() -> String {
    "waylink".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Messaging gateway REST client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Base URL of the gateway deployment (e.g. "http://gateway:8080").
    #[serde(default = "default_gateway_base_url")]
    pub base_url: String,

    /// Deployment-wide gateway credential. Used for instance create/delete/list.
    /// `None` requires the environment variable.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Externally reachable base URL of this deployment, used when registering
    /// per-instance webhook callbacks with the gateway.
    #[serde(default = "default_webhook_base_url")]
    pub webhook_base_url: String,

    /// Per-request timeout for gateway calls, in seconds.
    #[serde(default = "default_gateway_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_gateway_base_url(),
            api_key: None,
            webhook_base_url: default_webhook_base_url(),
            timeout_secs: default_gateway_timeout_secs(),
        }
    }
}

fn default_gateway_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_webhook_base_url() -> String {
    "http://localhost:3100".to_string()
}

fn default_gateway_timeout_secs() -> u64 {
    30
}

/// Inbound webhook server and authentication gate configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    /// Host address to bind.
    #[serde(default = "default_webhook_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_webhook_port")]
    pub port: u16,

    /// Operator-configured shared secret matched against the event body's
    /// credential field. Fallback for events not yet attributable to an account.
    #[serde(default)]
    pub shared_secret: Option<String>,

    /// Secret for HMAC-SHA256 signature verification over the raw body.
    /// `None` disables the signature check.
    #[serde(default)]
    pub signing_secret: Option<String>,

    /// Exact client addresses allowed to deliver webhooks, in addition to
    /// the alias sets below.
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    /// Accept loopback addresses (127.0.0.0/8, ::1).
    #[serde(default = "default_true")]
    pub allow_localhost: bool,

    /// Accept RFC 1918 / ULA private ranges, to tolerate container networking.
    #[serde(default = "default_true")]
    pub allow_private_networks: bool,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            host: default_webhook_host(),
            port: default_webhook_port(),
            shared_secret: None,
            signing_secret: None,
            allowed_origins: Vec::new(),
            allow_localhost: default_true(),
            allow_private_networks: default_true(),
        }
    }
}

fn default_webhook_host() -> String {
    "0.0.0.0".to_string()
}

fn default_webhook_port() -> u16 {
    3100
}

fn default_true() -> bool {
    true
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|d| d.join("waylink/waylink.db").display().to_string())
        .unwrap_or_else(|| "waylink.db".to_string())
}

/// Connection reconciler configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReconcilerConfig {
    /// Fixed poll interval, in seconds.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Soft deadline for one poll cycle, in seconds. Accounts not reached
    /// within the deadline wait for the next cycle.
    #[serde(default = "default_cycle_deadline_secs")]
    pub cycle_deadline_secs: u64,

    /// Maximum concurrent gateway queries per poll cycle.
    #[serde(default = "default_poll_concurrency")]
    pub poll_concurrency: usize,

    /// Consecutive unauthorized/not-found gateway reports before an account
    /// is marked disconnected and flagged orphaned.
    #[serde(default = "default_orphan_threshold")]
    pub orphan_threshold: u32,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            cycle_deadline_secs: default_cycle_deadline_secs(),
            poll_concurrency: default_poll_concurrency(),
            orphan_threshold: default_orphan_threshold(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_cycle_deadline_secs() -> u64 {
    25
}

fn default_poll_concurrency() -> usize {
    8
}

fn default_orphan_threshold() -> u32 {
    2
}

/// Outbound dispatch queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    /// Number of worker tasks executing jobs.
    #[serde(default = "default_dispatch_workers")]
    pub workers: usize,

    /// Attempt ceiling for transient failures. Permanent failures
    /// dead-letter after one attempt regardless.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay for exponential retry backoff, in milliseconds.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Upper bound on a single backoff delay, in milliseconds.
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,

    /// Per-tenant send ceiling per minute.
    #[serde(default = "default_rate_per_minute")]
    pub rate_per_minute: u32,

    /// Per-tenant send ceiling per hour.
    #[serde(default = "default_rate_per_hour")]
    pub rate_per_hour: u32,

    /// Idle sleep between queue claims when no job is due, in milliseconds.
    #[serde(default = "default_claim_interval_ms")]
    pub claim_interval_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: default_dispatch_workers(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            rate_per_minute: default_rate_per_minute(),
            rate_per_hour: default_rate_per_hour(),
            claim_interval_ms: default_claim_interval_ms(),
        }
    }
}

fn default_dispatch_workers() -> usize {
    4
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_base_ms() -> u64 {
    2_000
}

fn default_backoff_cap_ms() -> u64 {
    60_000
}

fn default_rate_per_minute() -> u32 {
    20
}

fn default_rate_per_hour() -> u32 {
    600
}

fn default_claim_interval_ms() -> u64 {
    500
}

/// Auto-response engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AutoReplyConfig {
    /// Timeout for a single provider call, in seconds. A timed-out call is
    /// treated as a provider failure, never retried synchronously.
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,
}

impl Default for AutoReplyConfig {
    fn default() -> Self {
        Self {
            provider_timeout_secs: default_provider_timeout_secs(),
        }
    }
}

fn default_provider_timeout_secs() -> u64 {
    30
}

/// Anthropic provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AnthropicConfig {
    /// Anthropic API key. `None` requires the environment variable.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model used for generated replies.
    #[serde(default = "default_model")]
    pub model: String,

    /// Anthropic API version string.
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            api_version: default_api_version(),
        }
    }
}

fn default_model() -> String {
    "claude-haiku-4-5-20250901".to_string()
}

fn default_api_version() -> String {
    "2023-06-01".to_string()
}
