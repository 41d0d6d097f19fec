// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message rows and delivery-status updates.

use rusqlite::{params, OptionalExtension};
use waylink_core::types::{DeliveryStatus, Direction};
use waylink_core::WaylinkError;

use crate::database::{map_tr_err, Database};
use crate::models::{AutomationRecord, StoredMessage};
use crate::queries::parse_text_enum;

/// Fields for a newly persisted message.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: String,
    pub conversation_id: String,
    pub direction: Direction,
    pub content: String,
    pub media_url: Option<String>,
    pub media_kind: Option<String>,
    pub delivery_status: DeliveryStatus,
}

fn row_to_message(row: &rusqlite::Row<'_>) -> Result<StoredMessage, rusqlite::Error> {
    let automation_model: Option<String> = row.get(8)?;
    let automation = match automation_model {
        Some(model) => Some(AutomationRecord {
            model,
            tokens: row.get::<_, i64>(9)? as u32,
            prompt_hash: row.get(10)?,
        }),
        None => None,
    };
    Ok(StoredMessage {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        direction: parse_text_enum(row.get::<_, String>(2)?)?,
        content: row.get(3)?,
        media_url: row.get(4)?,
        media_kind: row.get(5)?,
        delivery_status: parse_text_enum(row.get::<_, String>(6)?)?,
        delivery_error: row.get(7)?,
        automation,
        created_at: row.get(11)?,
    })
}

const MESSAGE_COLUMNS: &str = "id, conversation_id, direction, content, media_url, media_kind, \
     delivery_status, delivery_error, automation_model, automation_tokens, \
     automation_prompt_hash, created_at";

/// Insert a new message row.
pub async fn insert(db: &Database, message: &NewMessage) -> Result<(), WaylinkError> {
    let m = message.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO messages (id, conversation_id, direction, content, media_url, \
                 media_kind, delivery_status) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    m.id,
                    m.conversation_id,
                    m.direction.to_string(),
                    m.content,
                    m.media_url,
                    m.media_kind,
                    m.delivery_status.to_string()
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch a message by id.
pub async fn get(db: &Database, id: &str) -> Result<Option<StoredMessage>, WaylinkError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id],
                row_to_message,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Update delivery status, recording the error on failure.
///
/// Status is append-only forward progress; callers drive valid transitions
/// (`pending → sent → delivered → read`, any non-terminal → `failed`).
pub async fn set_delivery_status(
    db: &Database,
    id: &str,
    status: DeliveryStatus,
    error: Option<&str>,
) -> Result<(), WaylinkError> {
    let id = id.to_string();
    let error = error.map(str::to_string);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE messages SET delivery_status = ?2, delivery_error = ?3 WHERE id = ?1",
                params![id, status.to_string(), error],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Attach an automation record to a message produced or processed by the
/// auto-response engine.
pub async fn attach_automation(
    db: &Database,
    id: &str,
    record: &AutomationRecord,
) -> Result<(), WaylinkError> {
    let id = id.to_string();
    let record = record.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE messages SET automation_model = ?2, automation_tokens = ?3, \
                 automation_prompt_hash = ?4 WHERE id = ?1",
                params![id, record.model, record.tokens as i64, record.prompt_hash],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// The `limit` most recent messages of a conversation, oldest first.
///
/// This is the auto-response context window shape: chronological order,
/// bounded length.
pub async fn recent_for_conversation(
    db: &Database,
    conversation_id: &str,
    limit: u32,
) -> Result<Vec<StoredMessage>, WaylinkError> {
    let conversation_id = conversation_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = ?1 \
                 ORDER BY created_at DESC, rowid DESC LIMIT ?2"
            ))?;
            let mut messages = stmt
                .query_map(params![conversation_id, limit as i64], row_to_message)?
                .collect::<Result<Vec<_>, _>>()?;
            messages.reverse();
            Ok(messages)
        })
        .await
        .map_err(map_tr_err)
}

/// Number of automation-produced messages in a conversation since the
/// given timestamp. Used to count "conversations automated today".
pub async fn automated_count_since(
    db: &Database,
    conversation_id: &str,
    since: &str,
) -> Result<u64, WaylinkError> {
    let conversation_id = conversation_id.to_string();
    let since = since.to_string();
    db.connection()
        .call(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1 \
                 AND automation_model IS NOT NULL AND created_at >= ?2",
                params![conversation_id, since],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
        .map_err(map_tr_err)
}
