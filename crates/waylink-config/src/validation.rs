// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as valid bind addresses, non-empty paths, and
//! positive rate ceilings.

use crate::diagnostic::ConfigError;
use crate::model::WaylinkConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &WaylinkConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.gateway.base_url.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "gateway.base_url must not be empty".to_string(),
        });
    } else if !config.gateway.base_url.starts_with("http://")
        && !config.gateway.base_url.starts_with("https://")
    {
        errors.push(ConfigError::Validation {
            message: format!(
                "gateway.base_url `{}` must start with http:// or https://",
                config.gateway.base_url
            ),
        });
    }

    let host = config.webhook.host.trim();
    if host.is_empty() {
        errors.push(ConfigError::Validation {
            message: "webhook.host must not be empty".to_string(),
        });
    } else {
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            errors.push(ConfigError::Validation {
                message: format!("webhook.host `{host}` is not a valid IP address or hostname"),
            });
        }
    }

    for origin in &config.webhook.allowed_origins {
        if origin.parse::<std::net::IpAddr>().is_err() {
            errors.push(ConfigError::Validation {
                message: format!("webhook.allowed_origins entry `{origin}` is not an IP address"),
            });
        }
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    if config.reconciler.poll_interval_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "reconciler.poll_interval_secs must be at least 1".to_string(),
        });
    }

    if config.reconciler.cycle_deadline_secs > config.reconciler.poll_interval_secs {
        errors.push(ConfigError::Validation {
            message: format!(
                "reconciler.cycle_deadline_secs ({}) must not exceed poll_interval_secs ({})",
                config.reconciler.cycle_deadline_secs, config.reconciler.poll_interval_secs
            ),
        });
    }

    if config.reconciler.poll_concurrency == 0 {
        errors.push(ConfigError::Validation {
            message: "reconciler.poll_concurrency must be at least 1".to_string(),
        });
    }

    if config.dispatch.max_attempts == 0 {
        errors.push(ConfigError::Validation {
            message: "dispatch.max_attempts must be at least 1".to_string(),
        });
    }

    if config.dispatch.workers == 0 {
        errors.push(ConfigError::Validation {
            message: "dispatch.workers must be at least 1".to_string(),
        });
    }

    if config.dispatch.rate_per_minute == 0 || config.dispatch.rate_per_hour == 0 {
        errors.push(ConfigError::Validation {
            message: "dispatch rate ceilings must be at least 1 per minute and per hour"
                .to_string(),
        });
    }

    if config.dispatch.backoff_base_ms == 0
        || config.dispatch.backoff_cap_ms < config.dispatch.backoff_base_ms
    {
        errors.push(ConfigError::Validation {
            message: format!(
                "dispatch backoff must satisfy 0 < backoff_base_ms ({}) <= backoff_cap_ms ({})",
                config.dispatch.backoff_base_ms, config.dispatch.backoff_cap_ms
            ),
        });
    }

    if config.autoreply.provider_timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "autoreply.provider_timeout_secs must be at least 1".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
