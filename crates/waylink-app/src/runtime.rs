// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runtime wiring: storage, gateway client, reconciler, dispatch workers,
//! auto-reply engine, inbound pipeline, and webhook server, all under one
//! cancellation token.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use waylink_anthropic::AnthropicProvider;
use waylink_autoreply::AutoReplyEngine;
use waylink_config::model::WaylinkConfig;
use waylink_core::{GatewayApi, ReplyProvider, WaylinkError};
use waylink_dispatch::{spawn_workers, DispatchQueue, TenantRateLimiter};
use waylink_gateway::GatewayClient;
use waylink_reconciler::{spawn_poll_loop, Reconciler};
use waylink_storage::queries::jobs;
use waylink_storage::{now_iso, Database};
use waylink_webhook::{GateConfig, WebhookState};

use crate::pipeline::InboundPipeline;

/// Installs signal handlers for SIGTERM and SIGINT.
///
/// Returns a [`CancellationToken`] that is cancelled when either signal is
/// received.
pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm =
                signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

            tokio::select! {
                _ = ctrl_c => {
                    info!("received SIGINT (Ctrl+C), initiating shutdown");
                }
                _ = sigterm.recv() => {
                    info!("received SIGTERM, initiating shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, initiating shutdown");
        }

        token_clone.cancel();
        debug!("shutdown signal handler completed");
    });

    token
}

/// Run the full stack until the shutdown token fires.
pub async fn run(config: WaylinkConfig, shutdown: CancellationToken) -> Result<(), WaylinkError> {
    let db = Database::open(&config.storage.database_path).await?;

    // Jobs a previous process claimed but never finished return to the
    // queue before workers start.
    let released = jobs::release_expired_locks(&db, &now_iso()).await?;
    if released > 0 {
        info!(released, "released dispatch jobs from expired locks");
    }

    let gateway: Arc<dyn GatewayApi> = Arc::new(GatewayClient::new(&config.gateway)?);
    let provider: Arc<dyn ReplyProvider> = Arc::new(AnthropicProvider::new(&config.anthropic)?);

    let reconciler = Arc::new(Reconciler::new(
        db.clone(),
        gateway.clone(),
        config.reconciler.clone(),
    ));
    let engine = Arc::new(AutoReplyEngine::new(
        db.clone(),
        provider,
        config.autoreply.clone(),
    ));
    let queue = DispatchQueue::new(db.clone(), config.dispatch.clone());
    let limiter = Arc::new(TenantRateLimiter::new(&config.dispatch));

    let pipeline = Arc::new(InboundPipeline::new(
        db.clone(),
        reconciler.clone(),
        engine,
        queue,
    ));

    let poll_handle = spawn_poll_loop(
        reconciler,
        Duration::from_secs(config.reconciler.poll_interval_secs),
        shutdown.clone(),
    );
    let worker_handles = spawn_workers(
        db.clone(),
        gateway,
        config.dispatch.clone(),
        limiter,
        shutdown.clone(),
    );

    let webhook_state = WebhookState {
        db,
        gate: GateConfig::from_config(&config.webhook),
        sink: pipeline,
        start_time: std::time::Instant::now(),
    };

    info!("waylink runtime started");

    tokio::select! {
        result = waylink_webhook::start_server(
            &config.webhook.host,
            config.webhook.port,
            webhook_state,
        ) => {
            // The server only returns on bind/serve failure.
            shutdown.cancel();
            result?;
        }
        _ = shutdown.cancelled() => {
            info!("shutdown requested, draining background tasks");
        }
    }

    let _ = poll_handle.await;
    for handle in worker_handles {
        let _ = handle.await;
    }
    info!("waylink runtime stopped");
    Ok(())
}
