// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Usage-counter resets and quota checks.
//!
//! Reset boundaries are computed in UTC, regardless of the policy's
//! business-hours timezone. Counters reset exactly once per calendar
//! boundary crossed, never retroactively: the reset marker only moves
//! when a reset actually happens, and callers serialize updates per
//! tenant so counts accrued after the reset moment are never lost.

use chrono::{DateTime, Datelike, Utc};
use waylink_core::WaylinkError;
use waylink_storage::{PolicyLimits, UsageCounters};

/// Reset counters whose UTC calendar boundary has passed since the last
/// reset. Returns `true` when anything was reset.
pub fn maybe_reset(usage: &mut UsageCounters, now: DateTime<Utc>) -> bool {
    let last_reset = DateTime::parse_from_rfc3339(&usage.counters_reset_at)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);

    let mut reset = false;

    if last_reset.date_naive() != now.date_naive() {
        usage.tokens_today = 0;
        usage.conversations_today = 0;
        reset = true;
    }

    if (last_reset.year(), last_reset.month()) != (now.year(), now.month()) {
        usage.tokens_month = 0;
        reset = true;
    }

    if reset {
        usage.counters_reset_at = now.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
    }
    reset
}

/// Enforce hard quotas against current (post-reset) counters.
pub fn check_quota(limits: &PolicyLimits, usage: &UsageCounters) -> Result<(), WaylinkError> {
    if let Some(limit) = limits.daily_token_limit
        && usage.tokens_today >= limit
    {
        return Err(WaylinkError::QuotaExceeded {
            message: format!("daily token limit of {limit} reached"),
        });
    }
    if let Some(limit) = limits.monthly_token_limit
        && usage.tokens_month >= limit
    {
        return Err(WaylinkError::QuotaExceeded {
            message: format!("monthly token limit of {limit} reached"),
        });
    }
    if let Some(limit) = limits.daily_conversation_limit
        && usage.conversations_today >= limit
    {
        return Err(WaylinkError::QuotaExceeded {
            message: format!("daily automated-conversation limit of {limit} reached"),
        });
    }
    Ok(())
}
