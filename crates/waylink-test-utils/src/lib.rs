// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities: mock adapters implementing the core traits for fast,
//! CI-runnable tests without external services.

pub mod mock_gateway;
pub mod mock_provider;

pub use mock_gateway::{MockGateway, RecordedSend, SendScript, StateScript};
pub use mock_provider::{MockProvider, ProviderScript};
