// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Orchestration for the Waylink platform: the inbound event pipeline,
//! the application-facing service facade, and runtime wiring.

pub mod pipeline;
pub mod runtime;
pub mod service;

pub use pipeline::InboundPipeline;
pub use runtime::{install_signal_handler, run};
pub use service::{AppService, UsageStats};
