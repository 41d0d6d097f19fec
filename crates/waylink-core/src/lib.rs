// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Waylink platform.
//!
//! This crate provides the error taxonomy, shared domain types, and the
//! adapter traits (gateway, language-model provider) used throughout the
//! Waylink workspace.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::WaylinkError;
pub use traits::{GatewayApi, ReplyProvider};
pub use types::{
    AccountId, ConnectionState, ConversationId, DeliveryStatus, Direction, JobKind, JobStatus,
    MessageId, ReplyMode, StateSource, TenantId,
};
