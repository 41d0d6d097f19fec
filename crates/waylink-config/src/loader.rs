// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./waylink.toml` > `~/.config/waylink/waylink.toml`
//! > `/etc/waylink/waylink.toml` with environment variable overrides via the
//! `WAYLINK_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::WaylinkConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/waylink/waylink.toml` (system-wide)
/// 3. `~/.config/waylink/waylink.toml` (user XDG config)
/// 4. `./waylink.toml` (local directory)
/// 5. `WAYLINK_*` environment variables
pub fn load_config() -> Result<WaylinkConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(WaylinkConfig::default()))
        .merge(Toml::file("/etc/waylink/waylink.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("waylink/waylink.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("waylink.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<WaylinkConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(WaylinkConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<WaylinkConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(WaylinkConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `WAYLINK_GATEWAY_API_KEY` must map to
/// `gateway.api_key`, not `gateway.api.key`.
fn env_provider() -> Env {
    Env::prefixed("WAYLINK_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        // Example: WAYLINK_GATEWAY_API_KEY -> "gateway_api_key"
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("platform_", "platform.", 1)
            .replacen("gateway_", "gateway.", 1)
            .replacen("webhook_", "webhook.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("reconciler_", "reconciler.", 1)
            .replacen("dispatch_", "dispatch.", 1)
            .replacen("autoreply_", "autoreply.", 1)
            .replacen("anthropic_", "anthropic.", 1);
        mapped.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_from_str_overrides_defaults() {
        let config = load_config_from_str(
            r#"
            [gateway]
            base_url = "http://gateway.internal:8080"

            [webhook]
            port = 4000
            "#,
        )
        .unwrap();
        assert_eq!(config.gateway.base_url, "http://gateway.internal:8080");
        assert_eq!(config.webhook.port, 4000);
        // Untouched sections keep defaults.
        assert_eq!(config.dispatch.workers, 4);
    }

    #[test]
    fn load_from_str_empty_yields_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.platform.name, "waylink");
    }

    #[test]
    fn unknown_key_is_an_error() {
        let result = load_config_from_str(
            r#"
            [dispatch]
            max_atempts = 3
            "#,
        );
        assert!(result.is_err());
    }
}
