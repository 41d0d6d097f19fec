// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-message auto-response decision.

use chrono::{DateTime, Utc};
use waylink_core::types::ReplyMode;
use waylink_storage::AutoReplyPolicy;

use crate::hours::within_hours;

/// Decide whether an automated reply should be generated for an inbound
/// message under the given policy, at the given instant.
pub fn should_respond(policy: &AutoReplyPolicy, message_text: &str, now: DateTime<Utc>) -> bool {
    if !policy.enabled {
        return false;
    }
    match policy.mode {
        ReplyMode::Always => true,
        ReplyMode::BusinessHours => within_hours(&policy.hours, &policy.timezone, now),
        ReplyMode::OutsideHours => !within_hours(&policy.hours, &policy.timezone, now),
        ReplyMode::Keywords => keyword_match(&policy.keywords, message_text),
        ReplyMode::Manual => false,
    }
}

/// Case-insensitive substring match of any configured keyword.
fn keyword_match(keywords: &[String], text: &str) -> bool {
    let text = text.to_lowercase();
    keywords
        .iter()
        .filter(|k| !k.is_empty())
        .any(|keyword| text.contains(&keyword.to_lowercase()))
}
