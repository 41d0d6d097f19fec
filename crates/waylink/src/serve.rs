// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `waylink serve` and `waylink config` command implementations.

use tracing_subscriber::EnvFilter;
use waylink_config::model::WaylinkConfig;
use waylink_core::WaylinkError;

/// Initialize the tracing subscriber from the configured log level,
/// overridable via `RUST_LOG`.
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Run the `waylink serve` command: the webhook server, reconciler poll
/// loop, and dispatch workers, until SIGINT/SIGTERM.
pub async fn run_serve(config: WaylinkConfig) -> Result<(), WaylinkError> {
    init_tracing(&config.platform.log_level);
    tracing::info!(platform = %config.platform.name, "starting waylink serve");

    let shutdown = waylink_app::install_signal_handler();
    waylink_app::run(config, shutdown).await
}

/// Print the resolved configuration as TOML with secrets redacted.
pub fn print_config(config: &WaylinkConfig) {
    let mut redacted = config.clone();
    redact(&mut redacted.gateway.api_key);
    redact(&mut redacted.webhook.shared_secret);
    redact(&mut redacted.webhook.signing_secret);
    redact(&mut redacted.anthropic.api_key);

    match toml::to_string_pretty(&redacted) {
        Ok(rendered) => println!("{rendered}"),
        Err(e) => eprintln!("failed to render configuration: {e}"),
    }
}

fn redact(secret: &mut Option<String>) {
    if secret.is_some() {
        *secret = Some("[redacted]".to_string());
    }
}
