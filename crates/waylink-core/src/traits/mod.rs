// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter traits at the seams of the integration core.

pub mod gateway;
pub mod provider;

pub use gateway::GatewayApi;
pub use provider::ReplyProvider;
