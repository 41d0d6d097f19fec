// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Anthropic Claude provider adapter for Waylink.
//!
//! Implements [`waylink_core::ReplyProvider`] over the Anthropic Messages
//! API for auto-response generation.

pub mod client;
pub mod types;

pub use client::AnthropicProvider;
