// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection reconciliation for Waylink accounts.
//!
//! Tracks each account's connection lifecycle against the gateway's own
//! state by both polling and webhook, recovering from drift and orphaned
//! accounts.

pub mod poller;
pub mod reconciler;

pub use poller::spawn_poll_loop;
pub use reconciler::{ConnectOutcome, Reconciler};
