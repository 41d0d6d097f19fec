// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed-interval poll loop driving [`Reconciler::poll_all`].

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::reconciler::Reconciler;

/// Spawn the periodic poll loop. Cancelling the token stops it after the
/// in-flight cycle completes.
pub fn spawn_poll_loop(
    reconciler: Arc<Reconciler>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(interval_secs = interval.as_secs(), "reconciler poll loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    reconciler.poll_all().await;
                }
                _ = shutdown.cancelled() => {
                    debug!("reconciler poll loop stopped");
                    return;
                }
            }
        }
    })
}
