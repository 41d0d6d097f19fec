// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Auto-reply policy rows: one per tenant.
//!
//! Hours and keywords are explicit typed values serialized to JSON columns;
//! scalars get their own columns. Usage-counter writes go through
//! [`update_usage`] and are serialized per tenant by the auto-response
//! engine, never read-modify-written concurrently.

use rusqlite::{params, OptionalExtension};
use waylink_core::types::WeeklyHours;
use waylink_core::WaylinkError;

use crate::database::{map_tr_err, now_iso, Database};
use crate::models::{AutoReplyPolicy, PolicyLimits, UsageCounters};
use crate::queries::parse_text_enum;

fn row_to_policy(row: &rusqlite::Row<'_>) -> Result<AutoReplyPolicy, rusqlite::Error> {
    let hours_json: String = row.get(4)?;
    let keywords_json: String = row.get(5)?;
    let hours: WeeklyHours = serde_json::from_str(&hours_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let keywords: Vec<String> = serde_json::from_str(&keywords_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(AutoReplyPolicy {
        tenant_id: row.get(0)?,
        enabled: row.get::<_, i64>(1)? != 0,
        mode: parse_text_enum(row.get::<_, String>(2)?)?,
        timezone: row.get(3)?,
        hours,
        keywords,
        system_prompt: row.get(6)?,
        personality: row.get(7)?,
        temperature: row.get::<_, f64>(8)? as f32,
        max_tokens: row.get::<_, i64>(9)? as u32,
        context_window: row.get::<_, i64>(10)? as u32,
        reply_delay_secs: row.get::<_, i64>(11)? as u32,
        usage: UsageCounters {
            tokens_today: row.get::<_, i64>(12)? as u64,
            tokens_month: row.get::<_, i64>(13)? as u64,
            conversations_today: row.get::<_, i64>(14)? as u64,
            counters_reset_at: row.get(15)?,
        },
        limits: PolicyLimits {
            daily_token_limit: row.get::<_, Option<i64>>(16)?.map(|v| v as u64),
            monthly_token_limit: row.get::<_, Option<i64>>(17)?.map(|v| v as u64),
            daily_conversation_limit: row.get::<_, Option<i64>>(18)?.map(|v| v as u64),
        },
    })
}

const POLICY_COLUMNS: &str = "tenant_id, enabled, mode, timezone, hours_json, keywords_json, \
     system_prompt, personality, temperature, max_tokens, context_window, reply_delay_secs, \
     tokens_today, tokens_month, conversations_today, counters_reset_at, \
     daily_token_limit, monthly_token_limit, daily_conversation_limit";

/// Fetch a tenant's policy, if configured.
pub async fn get(db: &Database, tenant_id: &str) -> Result<Option<AutoReplyPolicy>, WaylinkError> {
    let tenant_id = tenant_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {POLICY_COLUMNS} FROM autoreply_policies WHERE tenant_id = ?1"),
                params![tenant_id],
                row_to_policy,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch a tenant's policy, falling back to the disabled default.
pub async fn get_or_default(
    db: &Database,
    tenant_id: &str,
) -> Result<AutoReplyPolicy, WaylinkError> {
    Ok(get(db, tenant_id)
        .await?
        .unwrap_or_else(|| AutoReplyPolicy::default_for(tenant_id)))
}

/// Insert or replace a tenant's policy configuration and counters.
pub async fn upsert(db: &Database, policy: &AutoReplyPolicy) -> Result<(), WaylinkError> {
    let p = policy.clone();
    let hours_json = serde_json::to_string(&p.hours).map_err(|e| WaylinkError::Storage {
        source: Box::new(e),
    })?;
    let keywords_json = serde_json::to_string(&p.keywords).map_err(|e| WaylinkError::Storage {
        source: Box::new(e),
    })?;

    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO autoreply_policies (tenant_id, enabled, mode, timezone, \
                 hours_json, keywords_json, system_prompt, personality, temperature, \
                 max_tokens, context_window, reply_delay_secs, tokens_today, tokens_month, \
                 conversations_today, counters_reset_at, daily_token_limit, \
                 monthly_token_limit, daily_conversation_limit, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, \
                 ?16, ?17, ?18, ?19, ?20) \
                 ON CONFLICT(tenant_id) DO UPDATE SET \
                 enabled = excluded.enabled, mode = excluded.mode, \
                 timezone = excluded.timezone, hours_json = excluded.hours_json, \
                 keywords_json = excluded.keywords_json, \
                 system_prompt = excluded.system_prompt, \
                 personality = excluded.personality, \
                 temperature = excluded.temperature, max_tokens = excluded.max_tokens, \
                 context_window = excluded.context_window, \
                 reply_delay_secs = excluded.reply_delay_secs, \
                 tokens_today = excluded.tokens_today, \
                 tokens_month = excluded.tokens_month, \
                 conversations_today = excluded.conversations_today, \
                 counters_reset_at = excluded.counters_reset_at, \
                 daily_token_limit = excluded.daily_token_limit, \
                 monthly_token_limit = excluded.monthly_token_limit, \
                 daily_conversation_limit = excluded.daily_conversation_limit, \
                 updated_at = excluded.updated_at",
                params![
                    p.tenant_id,
                    p.enabled as i64,
                    p.mode.to_string(),
                    p.timezone,
                    hours_json,
                    keywords_json,
                    p.system_prompt,
                    p.personality,
                    p.temperature as f64,
                    p.max_tokens as i64,
                    p.context_window as i64,
                    p.reply_delay_secs as i64,
                    p.usage.tokens_today as i64,
                    p.usage.tokens_month as i64,
                    p.usage.conversations_today as i64,
                    p.usage.counters_reset_at,
                    p.limits.daily_token_limit.map(|v| v as i64),
                    p.limits.monthly_token_limit.map(|v| v as i64),
                    p.limits.daily_conversation_limit.map(|v| v as i64),
                    now_iso()
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Toggle a policy's enablement flag without touching the rest.
pub async fn set_enabled(
    db: &Database,
    tenant_id: &str,
    enabled: bool,
) -> Result<(), WaylinkError> {
    let tenant_id = tenant_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE autoreply_policies SET enabled = ?2, updated_at = ?3 \
                 WHERE tenant_id = ?1",
                params![tenant_id, enabled as i64, now_iso()],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Persist usage counters after the engine's serialized update.
pub async fn update_usage(
    db: &Database,
    tenant_id: &str,
    usage: &UsageCounters,
) -> Result<(), WaylinkError> {
    let tenant_id = tenant_id.to_string();
    let usage = usage.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE autoreply_policies SET tokens_today = ?2, tokens_month = ?3, \
                 conversations_today = ?4, counters_reset_at = ?5, updated_at = ?6 \
                 WHERE tenant_id = ?1",
                params![
                    tenant_id,
                    usage.tokens_today as i64,
                    usage.tokens_month as i64,
                    usage.conversations_today as i64,
                    usage.counters_reset_at,
                    now_iso()
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
