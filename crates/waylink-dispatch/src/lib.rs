// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound dispatch: a durable, rate-limited, retrying queue for single,
//! bulk, and scheduled message sends.

pub mod backoff;
pub mod queue;
pub mod ratelimit;
pub mod worker;

pub use queue::DispatchQueue;
pub use ratelimit::{RateSnapshot, TenantRateLimiter};
pub use worker::{execute_job, spawn_workers, JobOutcome};
