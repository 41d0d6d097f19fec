// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Account rows and the connection-state merge.
//!
//! Poll results and webhook events both write connection state through
//! [`apply_observation`], which enforces the staleness rule: a webhook
//! observation applies when it is at least as new as the stored one, a
//! poll observation only when strictly newer. `failed` accounts ignore
//! observations entirely; they require manual recreation.

use rusqlite::{params, OptionalExtension};
use waylink_core::types::{ConnectionState, StateSource};
use waylink_core::WaylinkError;

use crate::database::{map_tr_err, now_iso, Database};
use crate::models::Account;
use crate::queries::parse_text_enum;

/// Fields for a newly created account row.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub instance_key: String,
    /// `None` when gateway provisioning failed; the row is created anyway
    /// (state `failed`) to avoid silent loss.
    pub instance_token: Option<String>,
    pub state: ConnectionState,
}

/// A connection-state observation from either reconciliation source.
#[derive(Debug, Clone)]
pub struct StateObservation {
    pub state: ConnectionState,
    pub phone_number: Option<String>,
    pub pairing_code: Option<String>,
    /// When the observation was made, ISO 8601 UTC.
    pub observed_at: String,
    pub source: StateSource,
}

fn row_to_account(row: &rusqlite::Row<'_>) -> Result<Account, rusqlite::Error> {
    Ok(Account {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        name: row.get(2)?,
        instance_key: row.get(3)?,
        instance_token: row.get(4)?,
        state: parse_text_enum(row.get::<_, String>(5)?)?,
        phone_number: row.get(6)?,
        pairing_code: row.get(7)?,
        last_connected_at: row.get(8)?,
        state_observed_at: row.get(9)?,
        state_source: row
            .get::<_, Option<String>>(10)?
            .map(parse_text_enum)
            .transpose()?,
        gateway_misses: row.get::<_, i64>(11)? as u32,
        orphaned: row.get::<_, i64>(12)? != 0,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
        deleted_at: row.get(15)?,
    })
}

const ACCOUNT_COLUMNS: &str = "id, tenant_id, name, instance_key, instance_token, state, \
     phone_number, pairing_code, last_connected_at, state_observed_at, state_source, \
     gateway_misses, orphaned, created_at, updated_at, deleted_at";

/// Insert a new account row.
pub async fn insert(db: &Database, account: &NewAccount) -> Result<(), WaylinkError> {
    let a = account.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO accounts (id, tenant_id, name, instance_key, instance_token, state)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    a.id,
                    a.tenant_id,
                    a.name,
                    a.instance_key,
                    a.instance_token,
                    a.state.to_string()
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch an account by id. Soft-deleted rows are returned; callers that
/// must exclude them check `deleted_at`.
pub async fn get(db: &Database, id: &str) -> Result<Option<Account>, WaylinkError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1"),
                params![id],
                row_to_account,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch an account by its gateway instance key.
pub async fn get_by_instance_key(
    db: &Database,
    instance_key: &str,
) -> Result<Option<Account>, WaylinkError> {
    let instance_key = instance_key.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {ACCOUNT_COLUMNS} FROM accounts \
                     WHERE instance_key = ?1 AND deleted_at IS NULL"
                ),
                params![instance_key],
                row_to_account,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// List a tenant's live accounts.
pub async fn list_for_tenant(
    db: &Database,
    tenant_id: &str,
) -> Result<Vec<Account>, WaylinkError> {
    let tenant_id = tenant_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ACCOUNT_COLUMNS} FROM accounts \
                 WHERE tenant_id = ?1 AND deleted_at IS NULL ORDER BY created_at"
            ))?;
            let accounts = stmt
                .query_map(params![tenant_id], row_to_account)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(accounts)
        })
        .await
        .map_err(map_tr_err)
}

/// Accounts eligible for the reconciler's poll cycle: live rows in
/// `connected` or `connecting` state. `failed` is never auto-retried.
pub async fn list_pollable(db: &Database) -> Result<Vec<Account>, WaylinkError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ACCOUNT_COLUMNS} FROM accounts \
                 WHERE state IN ('connected', 'connecting') AND deleted_at IS NULL \
                 ORDER BY id"
            ))?;
            let accounts = stmt
                .query_map([], row_to_account)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(accounts)
        })
        .await
        .map_err(map_tr_err)
}

/// Apply a state observation under the merge rule. Returns `true` when the
/// observation was applied, `false` when it was stale or the account is
/// `failed`/missing.
pub async fn apply_observation(
    db: &Database,
    account_id: &str,
    observation: &StateObservation,
) -> Result<bool, WaylinkError> {
    let account_id = account_id.to_string();
    let obs = observation.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            let current: Option<(String, Option<String>)> = tx
                .query_row(
                    "SELECT state, state_observed_at FROM accounts \
                     WHERE id = ?1 AND deleted_at IS NULL",
                    params![account_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let Some((stored_state, stored_observed_at)) = current else {
                tx.commit()?;
                return Ok(false);
            };

            if stored_state == ConnectionState::Failed.to_string() {
                tx.commit()?;
                return Ok(false);
            }

            // ISO 8601 UTC strings of fixed format compare lexicographically.
            let applies = match (&stored_observed_at, obs.source) {
                (None, _) => true,
                (Some(stored), StateSource::Webhook) => obs.observed_at.as_str() >= stored.as_str(),
                (Some(stored), StateSource::Poll) => obs.observed_at.as_str() > stored.as_str(),
            };
            if !applies {
                tx.commit()?;
                return Ok(false);
            }

            match obs.state {
                ConnectionState::Connected => {
                    tx.execute(
                        "UPDATE accounts SET state = 'connected',
                             phone_number = COALESCE(?2, phone_number),
                             pairing_code = NULL,
                             last_connected_at = ?3,
                             state_observed_at = ?3,
                             state_source = ?4,
                             gateway_misses = 0,
                             orphaned = 0,
                             updated_at = ?5
                         WHERE id = ?1",
                        params![
                            account_id,
                            obs.phone_number,
                            obs.observed_at,
                            obs.source.to_string(),
                            now_iso()
                        ],
                    )?;
                }
                ConnectionState::Connecting => {
                    tx.execute(
                        "UPDATE accounts SET state = 'connecting',
                             pairing_code = COALESCE(?2, pairing_code),
                             state_observed_at = ?3,
                             state_source = ?4,
                             updated_at = ?5
                         WHERE id = ?1",
                        params![
                            account_id,
                            obs.pairing_code,
                            obs.observed_at,
                            obs.source.to_string(),
                            now_iso()
                        ],
                    )?;
                }
                ConnectionState::Disconnected => {
                    tx.execute(
                        "UPDATE accounts SET state = 'disconnected',
                             pairing_code = NULL,
                             state_observed_at = ?2,
                             state_source = ?3,
                             updated_at = ?4
                         WHERE id = ?1",
                        params![
                            account_id,
                            obs.observed_at,
                            obs.source.to_string(),
                            now_iso()
                        ],
                    )?;
                }
                // Observations never produce `failed`; it is set only by
                // explicit provisioning-error paths.
                ConnectionState::Failed => {
                    tx.commit()?;
                    return Ok(false);
                }
            }

            tx.commit()?;
            Ok(true)
        })
        .await
        .map_err(map_tr_err)
}

/// Store a freshly requested pairing payload and move the account to
/// `connecting`. Used by the explicit connect operation, which is
/// authoritative over any stored observation.
pub async fn set_pairing(
    db: &Database,
    id: &str,
    pairing_code: &str,
) -> Result<(), WaylinkError> {
    let id = id.to_string();
    let pairing_code = pairing_code.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE accounts SET state = 'connecting', pairing_code = ?2,
                     state_observed_at = ?3, state_source = NULL, updated_at = ?3
                 WHERE id = ?1",
                params![id, pairing_code, now_iso()],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Explicit local disconnect: authoritative, bypasses the merge.
pub async fn mark_disconnected(db: &Database, id: &str) -> Result<(), WaylinkError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE accounts SET state = 'disconnected', pairing_code = NULL,
                     state_observed_at = ?2, state_source = NULL, updated_at = ?2
                 WHERE id = ?1",
                params![id, now_iso()],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Mark an account connected from an explicit, authoritative operation.
pub async fn mark_connected(
    db: &Database,
    id: &str,
    phone_number: Option<&str>,
) -> Result<(), WaylinkError> {
    let id = id.to_string();
    let phone_number = phone_number.map(str::to_string);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE accounts SET state = 'connected',
                     phone_number = COALESCE(?2, phone_number),
                     pairing_code = NULL, last_connected_at = ?3,
                     state_observed_at = ?3, state_source = NULL,
                     gateway_misses = 0, orphaned = 0, updated_at = ?3
                 WHERE id = ?1",
                params![id, phone_number, now_iso()],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Unrecoverable provisioning error. Manual recreation required.
pub async fn mark_failed(db: &Database, id: &str) -> Result<(), WaylinkError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE accounts SET state = 'failed', pairing_code = NULL,
                     state_observed_at = ?2, state_source = NULL, updated_at = ?2
                 WHERE id = ?1",
                params![id, now_iso()],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Record one unauthorized/not-found gateway report. Returns the new
/// consecutive-miss count.
pub async fn record_gateway_miss(db: &Database, id: &str) -> Result<u32, WaylinkError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE accounts SET gateway_misses = gateway_misses + 1, updated_at = ?2
                 WHERE id = ?1",
                params![id, now_iso()],
            )?;
            let misses: i64 = conn.query_row(
                "SELECT gateway_misses FROM accounts WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )?;
            Ok(misses as u32)
        })
        .await
        .map_err(map_tr_err)
}

/// Clear the consecutive-miss counter after a successful gateway query.
pub async fn clear_gateway_misses(db: &Database, id: &str) -> Result<(), WaylinkError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE accounts SET gateway_misses = 0 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Mark an account orphaned: disconnected locally and flagged for
/// operator attention.
pub async fn mark_orphaned(db: &Database, id: &str) -> Result<(), WaylinkError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE accounts SET state = 'disconnected', pairing_code = NULL,
                     orphaned = 1, state_observed_at = ?2, state_source = NULL,
                     updated_at = ?2
                 WHERE id = ?1",
                params![id, now_iso()],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Replace the account's gateway credential.
pub async fn update_token(db: &Database, id: &str, token: &str) -> Result<(), WaylinkError> {
    let id = id.to_string();
    let token = token.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE accounts SET instance_token = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, token, now_iso()],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Soft-delete an account.
pub async fn soft_delete(db: &Database, id: &str) -> Result<(), WaylinkError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE accounts SET deleted_at = ?2, updated_at = ?2 WHERE id = ?1",
                params![id, now_iso()],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    async fn seed_account(db: &Database, id: &str) {
        insert(
            db,
            &NewAccount {
                id: id.to_string(),
                tenant_id: "tenant-1".to_string(),
                name: "Support line".to_string(),
                instance_key: format!("wa-{id}"),
                instance_token: Some("tok-123".to_string()),
                state: ConnectionState::Disconnected,
            },
        )
        .await
        .unwrap();
    }

    fn observation(
        state: ConnectionState,
        observed_at: &str,
        source: StateSource,
    ) -> StateObservation {
        StateObservation {
            state,
            phone_number: Some("15551234567".to_string()),
            pairing_code: None,
            observed_at: observed_at.to_string(),
            source,
        }
    }

    #[tokio::test]
    async fn insert_and_get_round_trip() {
        let db = setup().await;
        seed_account(&db, "acc-1").await;

        let account = get(&db, "acc-1").await.unwrap().unwrap();
        assert_eq!(account.tenant_id, "tenant-1");
        assert_eq!(account.state, ConnectionState::Disconnected);
        assert_eq!(account.instance_token.as_deref(), Some("tok-123"));
        assert!(!account.orphaned);

        let by_key = get_by_instance_key(&db, "wa-acc-1").await.unwrap().unwrap();
        assert_eq!(by_key.id, "acc-1");
    }

    #[tokio::test]
    async fn newer_observation_applies_and_sets_invariants() {
        let db = setup().await;
        seed_account(&db, "acc-1").await;

        let applied = apply_observation(
            &db,
            "acc-1",
            &observation(
                ConnectionState::Connected,
                "2026-08-07T10:00:00.000Z",
                StateSource::Poll,
            ),
        )
        .await
        .unwrap();
        assert!(applied);

        let account = get(&db, "acc-1").await.unwrap().unwrap();
        assert_eq!(account.state, ConnectionState::Connected);
        // connected => non-null phone identity, null pairing payload.
        assert_eq!(account.phone_number.as_deref(), Some("15551234567"));
        assert!(account.pairing_code.is_none());
        assert!(account.last_connected_at.is_some());
        assert_eq!(account.state_source, Some(StateSource::Poll));
    }

    #[tokio::test]
    async fn stale_poll_does_not_overwrite_newer_webhook() {
        let db = setup().await;
        seed_account(&db, "acc-1").await;

        // Webhook reports disconnect at T2.
        let applied = apply_observation(
            &db,
            "acc-1",
            &StateObservation {
                state: ConnectionState::Disconnected,
                phone_number: None,
                pairing_code: None,
                observed_at: "2026-08-07T10:00:05.000Z".to_string(),
                source: StateSource::Webhook,
            },
        )
        .await
        .unwrap();
        assert!(applied);

        // A poll result observed at T1 < T2 must not resurrect `connected`.
        let applied = apply_observation(
            &db,
            "acc-1",
            &observation(
                ConnectionState::Connected,
                "2026-08-07T10:00:01.000Z",
                StateSource::Poll,
            ),
        )
        .await
        .unwrap();
        assert!(!applied);

        let account = get(&db, "acc-1").await.unwrap().unwrap();
        assert_eq!(account.state, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn webhook_wins_ties_poll_does_not() {
        let db = setup().await;
        seed_account(&db, "acc-1").await;

        let ts = "2026-08-07T10:00:00.000Z";
        assert!(apply_observation(
            &db,
            "acc-1",
            &observation(ConnectionState::Connecting, ts, StateSource::Poll)
        )
        .await
        .unwrap());

        // Same timestamp: poll-sourced update is not strictly newer.
        assert!(!apply_observation(
            &db,
            "acc-1",
            &observation(ConnectionState::Connected, ts, StateSource::Poll)
        )
        .await
        .unwrap());

        // Same timestamp: webhook-sourced update applies.
        assert!(apply_observation(
            &db,
            "acc-1",
            &observation(ConnectionState::Connected, ts, StateSource::Webhook)
        )
        .await
        .unwrap());

        let account = get(&db, "acc-1").await.unwrap().unwrap();
        assert_eq!(account.state, ConnectionState::Connected);
    }

    #[tokio::test]
    async fn failed_accounts_ignore_observations() {
        let db = setup().await;
        seed_account(&db, "acc-1").await;
        mark_failed(&db, "acc-1").await.unwrap();

        let applied = apply_observation(
            &db,
            "acc-1",
            &observation(
                ConnectionState::Connected,
                "2027-01-01T00:00:00.000Z",
                StateSource::Webhook,
            ),
        )
        .await
        .unwrap();
        assert!(!applied);

        let account = get(&db, "acc-1").await.unwrap().unwrap();
        assert_eq!(account.state, ConnectionState::Failed);
    }

    #[tokio::test]
    async fn gateway_misses_count_and_orphan() {
        let db = setup().await;
        seed_account(&db, "acc-1").await;

        assert_eq!(record_gateway_miss(&db, "acc-1").await.unwrap(), 1);
        assert_eq!(record_gateway_miss(&db, "acc-1").await.unwrap(), 2);

        mark_orphaned(&db, "acc-1").await.unwrap();
        let account = get(&db, "acc-1").await.unwrap().unwrap();
        assert!(account.orphaned);
        assert_eq!(account.state, ConnectionState::Disconnected);

        clear_gateway_misses(&db, "acc-1").await.unwrap();
        let account = get(&db, "acc-1").await.unwrap().unwrap();
        assert_eq!(account.gateway_misses, 0);
    }

    #[tokio::test]
    async fn pollable_excludes_failed_disconnected_and_deleted() {
        let db = setup().await;
        for id in ["a", "b", "c", "d"] {
            seed_account(&db, id).await;
        }
        mark_connected(&db, "a", Some("111")).await.unwrap();
        set_pairing(&db, "b", "PAIR-1").await.unwrap();
        mark_failed(&db, "c").await.unwrap();
        mark_connected(&db, "d", Some("222")).await.unwrap();
        soft_delete(&db, "d").await.unwrap();

        let pollable = list_pollable(&db).await.unwrap();
        let ids: Vec<&str> = pollable.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn soft_deleted_hidden_from_tenant_listing() {
        let db = setup().await;
        seed_account(&db, "acc-1").await;
        seed_account(&db, "acc-2").await;
        soft_delete(&db, "acc-1").await.unwrap();

        let accounts = list_for_tenant(&db, "tenant-1").await.unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].id, "acc-2");
    }
}
