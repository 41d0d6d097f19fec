// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation rows: one per (account, counterpart address) pair,
//! created lazily on first message.

use rusqlite::{params, OptionalExtension};
use waylink_core::types::ConversationStatus;
use waylink_core::WaylinkError;

use crate::database::{map_tr_err, now_iso, Database};
use crate::models::Conversation;
use crate::queries::parse_text_enum;

fn row_to_conversation(row: &rusqlite::Row<'_>) -> Result<Conversation, rusqlite::Error> {
    Ok(Conversation {
        id: row.get(0)?,
        account_id: row.get(1)?,
        counterpart: row.get(2)?,
        status: parse_text_enum(row.get::<_, String>(3)?)?,
        unread_count: row.get::<_, i64>(4)? as u32,
        last_activity_at: row.get(5)?,
        created_at: row.get(6)?,
    })
}

const CONVERSATION_COLUMNS: &str =
    "id, account_id, counterpart, status, unread_count, last_activity_at, created_at";

/// Fetch the conversation for (account, counterpart), creating it if absent.
pub async fn get_or_create(
    db: &Database,
    account_id: &str,
    counterpart: &str,
) -> Result<Conversation, WaylinkError> {
    let account_id = account_id.to_string();
    let counterpart = counterpart.to_string();
    db.connection()
        .call(move |conn| {
            let existing = conn
                .query_row(
                    &format!(
                        "SELECT {CONVERSATION_COLUMNS} FROM conversations \
                         WHERE account_id = ?1 AND counterpart = ?2"
                    ),
                    params![account_id, counterpart],
                    row_to_conversation,
                )
                .optional()?;

            if let Some(conversation) = existing {
                return Ok(conversation);
            }

            let id = uuid::Uuid::new_v4().to_string();
            conn.execute(
                "INSERT INTO conversations (id, account_id, counterpart) VALUES (?1, ?2, ?3)",
                params![id, account_id, counterpart],
            )?;
            conn.query_row(
                &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"),
                params![id],
                row_to_conversation,
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch a conversation by id.
pub async fn get(db: &Database, id: &str) -> Result<Option<Conversation>, WaylinkError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"),
                params![id],
                row_to_conversation,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Bump last-activity; optionally increment the unread counter (inbound).
pub async fn touch(
    db: &Database,
    id: &str,
    increment_unread: bool,
) -> Result<(), WaylinkError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            if increment_unread {
                conn.execute(
                    "UPDATE conversations SET last_activity_at = ?2,
                         unread_count = unread_count + 1
                     WHERE id = ?1",
                    params![id, now_iso()],
                )?;
            } else {
                conn.execute(
                    "UPDATE conversations SET last_activity_at = ?2 WHERE id = ?1",
                    params![id, now_iso()],
                )?;
            }
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Zero the unread counter.
pub async fn mark_read(db: &Database, id: &str) -> Result<(), WaylinkError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE conversations SET unread_count = 0 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Set the conversation lifecycle status.
pub async fn set_status(
    db: &Database,
    id: &str,
    status: ConversationStatus,
) -> Result<(), WaylinkError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE conversations SET status = ?2 WHERE id = ?1",
                params![id, status.to_string()],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// List an account's conversations, most recently active first.
pub async fn list_for_account(
    db: &Database,
    account_id: &str,
) -> Result<Vec<Conversation>, WaylinkError> {
    let account_id = account_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONVERSATION_COLUMNS} FROM conversations \
                 WHERE account_id = ?1 ORDER BY last_activity_at DESC"
            ))?;
            let conversations = stmt
                .query_map(params![account_id], row_to_conversation)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(conversations)
        })
        .await
        .map_err(map_tr_err)
}
