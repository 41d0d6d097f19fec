// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed REST client for the external WhatsApp messaging gateway.
//!
//! Implements [`waylink_core::GatewayApi`] over the gateway's HTTP surface:
//! instance provisioning, connection state, pairing, text sends, logout,
//! deletion, and listing. No business logic lives here.

pub mod client;
pub mod types;

pub use client::GatewayClient;
