// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded exponential retry backoff.

use std::time::Duration;

use rand::Rng;
use waylink_config::model::DispatchConfig;

/// Deterministic backoff for the given attempt number (1-based): base
/// delay doubling per attempt, capped.
pub fn backoff_delay(config: &DispatchConfig, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    let ms = config
        .backoff_base_ms
        .saturating_mul(1u64 << exp)
        .min(config.backoff_cap_ms);
    Duration::from_millis(ms)
}

/// Backoff with ±20% jitter so retries from one incident spread out.
pub fn backoff_delay_jittered(config: &DispatchConfig, attempt: u32) -> Duration {
    let base = backoff_delay(config, attempt);
    let factor = rand::thread_rng().gen_range(0.8..1.2);
    base.mul_f64(factor)
}
